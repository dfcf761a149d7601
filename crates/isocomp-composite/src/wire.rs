//! Binary form of [`PolyData`] exchanged between ranks.
//!
//! Layout (little-endian on every supported target, no padding):
//!
//! ```text
//! WireHeader
//! points                    f32 x 3 * num_points
//! per cell kind             offsets u32 x (cells + 1), connectivity u32 x len
//! point arrays, cell arrays ArrayHeader, name bytes, values f32 x components * tuples
//! ```
//!
//! Only round-trip fidelity between ranks of one build matters.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use isocomp_core::{
    AttributeSet, CellArray, CellKind, DataArray, IsocompError, PolyData, Result,
};

const MAGIC: u32 = u32::from_le_bytes(*b"ISOP");
const VERSION: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct WireHeader {
    magic: u32,
    version: u32,
    num_points: u32,
    num_point_arrays: u32,
    num_cell_arrays: u32,
    cell_counts: [u32; 4],
    connectivity_lens: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ArrayHeader {
    name_len: u32,
    components: u32,
    tuples: u32,
    /// Non-zero when this is the set's active scalars.
    active: u32,
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| IsocompError::Decode(format!("{value} does not fit the wire format")))
}

/// Serializes `poly`.
pub fn encode(poly: &PolyData) -> Result<Vec<u8>> {
    let mut cell_counts = [0; 4];
    let mut connectivity_lens = [0; 4];
    for kind in CellKind::ALL {
        let cells = poly.cells(kind);
        cell_counts[kind.index()] = to_u32(cells.len())?;
        connectivity_lens[kind.index()] = to_u32(cells.connectivity().len())?;
    }
    let header = WireHeader {
        magic: MAGIC,
        version: VERSION,
        num_points: to_u32(poly.num_points())?,
        num_point_arrays: to_u32(poly.point_data.len())?,
        num_cell_arrays: to_u32(poly.cell_data.len())?,
        cell_counts,
        connectivity_lens,
    };

    let mut out = Vec::with_capacity(encoded_len_hint(poly));
    out.extend_from_slice(bytemuck::bytes_of(&header));
    for p in &poly.points {
        out.extend_from_slice(bytemuck::cast_slice(&p.to_array()));
    }
    for kind in CellKind::ALL {
        let cells = poly.cells(kind);
        out.extend_from_slice(bytemuck::cast_slice(cells.offsets()));
        out.extend_from_slice(bytemuck::cast_slice(cells.connectivity()));
    }
    write_attributes(&mut out, &poly.point_data)?;
    write_attributes(&mut out, &poly.cell_data)?;
    Ok(out)
}

fn encoded_len_hint(poly: &PolyData) -> usize {
    let cells: usize = CellKind::ALL
        .iter()
        .map(|&k| poly.cells(k).len() + 1 + poly.cells(k).connectivity().len())
        .sum();
    let arrays: usize = poly
        .point_data
        .iter()
        .chain(poly.cell_data.iter())
        .map(|a| std::mem::size_of::<ArrayHeader>() + a.name().len() + 4 * a.values().len())
        .sum();
    std::mem::size_of::<WireHeader>() + 12 * poly.num_points() + 4 * cells + arrays
}

fn write_attributes(out: &mut Vec<u8>, attributes: &AttributeSet) -> Result<()> {
    for array in attributes.iter() {
        let header = ArrayHeader {
            name_len: to_u32(array.name().len())?,
            components: to_u32(array.components())?,
            tuples: to_u32(array.len())?,
            active: u32::from(attributes.active_scalars() == Some(array.name())),
        };
        out.extend_from_slice(bytemuck::bytes_of(&header));
        out.extend_from_slice(array.name().as_bytes());
        out.extend_from_slice(bytemuck::cast_slice(array.values()));
    }
    Ok(())
}

/// Cursor over an encoded buffer. Reads copy, so the input needs no alignment.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(IsocompError::Decode(format!(
                "truncated buffer: need {len} bytes, {} left",
                self.bytes.len()
            )));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn read<T: Pod>(&mut self) -> Result<T> {
        Ok(bytemuck::pod_read_unaligned(
            self.take(std::mem::size_of::<T>())?,
        ))
    }

    fn read_vec<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let len = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| IsocompError::Decode("length overflow".into()))?;
        Ok(bytemuck::pod_collect_to_vec(self.take(len)?))
    }
}

/// Deserializes a buffer produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<PolyData> {
    let mut reader = Reader { bytes };
    let header: WireHeader = reader.read()?;
    if header.magic != MAGIC {
        return Err(IsocompError::Decode("bad magic".into()));
    }
    if header.version != VERSION {
        return Err(IsocompError::Decode(format!(
            "unsupported version {}",
            header.version
        )));
    }

    let num_points = header.num_points as usize;
    let coords: Vec<f32> = reader.read_vec(num_points * 3)?;
    let mut poly = PolyData::new();
    poly.points = coords
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0], c[1], c[2]))
        .collect();

    for kind in CellKind::ALL {
        let i = kind.index();
        let offsets = reader.read_vec(header.cell_counts[i] as usize + 1)?;
        let connectivity = reader.read_vec(header.connectivity_lens[i] as usize)?;
        *poly.cells_mut(kind) = CellArray::from_parts(offsets, connectivity)?;
    }

    poly.point_data = read_attributes(&mut reader, header.num_point_arrays)?;
    poly.cell_data = read_attributes(&mut reader, header.num_cell_arrays)?;
    if !reader.bytes.is_empty() {
        return Err(IsocompError::Decode(format!(
            "{} trailing bytes",
            reader.bytes.len()
        )));
    }
    poly.validate()?;
    Ok(poly)
}

fn read_attributes(reader: &mut Reader<'_>, count: u32) -> Result<AttributeSet> {
    let mut attributes = AttributeSet::new();
    for _ in 0..count {
        let header: ArrayHeader = reader.read()?;
        let name = std::str::from_utf8(reader.take(header.name_len as usize)?)
            .map_err(|e| IsocompError::Decode(format!("array name: {e}")))?
            .to_string();
        let components = header.components as usize;
        let values = reader.read_vec(components * header.tuples as usize)?;
        let array = DataArray::new(name.clone(), components, values)?;
        attributes.insert(array);
        if header.active != 0 {
            attributes.set_active_scalars(Some(name));
        }
    }
    Ok(attributes)
}
