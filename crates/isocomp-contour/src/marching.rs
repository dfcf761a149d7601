//! Contouring of volume meshes at one isovalue.
//!
//! Hexahedra go through the marching cubes triangle table (ported from the public-domain
//! `MarchingCubeCpp`), tetrahedra through the marching tetrahedra cases. Edge vertices are
//! keyed on the global point pair, so neighbouring cells share them and the output is a
//! connected surface. Point attributes are interpolated onto the new vertices; cell
//! attributes are copied onto every triangle the cell produces.

#![allow(clippy::unreadable_literal, clippy::cast_possible_truncation)]

use std::collections::HashMap;

use glam::Vec3;
use isocomp_core::{AttributeSet, IsocompError, PolyData, Result, VolumeCell, VolumeMesh};

/// Which cells a contour pass may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateCells<'a> {
    /// Every cell of the mesh.
    All,
    /// Only these cell ids. An empty list contours nothing.
    Only(&'a [u32]),
}

/// Extracts the isosurface of a node-centered scalar field.
pub trait ContourPrimitive {
    /// Contours `mesh` where `scalars` (one per point) equals `isovalue`.
    ///
    /// Returns polygonal data with the mesh's point and cell attributes carried over.
    /// An output without cells is a normal result.
    fn contour_at(
        &self,
        mesh: &VolumeMesh,
        scalars: &[f32],
        isovalue: f64,
        candidates: CandidateCells<'_>,
    ) -> Result<PolyData>;
}

/// Marching cubes for hexahedra, marching tetrahedra for tetrahedra.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarchingCells;

impl ContourPrimitive for MarchingCells {
    fn contour_at(
        &self,
        mesh: &VolumeMesh,
        scalars: &[f32],
        isovalue: f64,
        candidates: CandidateCells<'_>,
    ) -> Result<PolyData> {
        if scalars.len() != mesh.num_points() {
            return Err(IsocompError::SizeMismatch {
                expected: mesh.num_points(),
                actual: scalars.len(),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let mut builder = SurfaceBuilder::new(mesh, scalars, isovalue as f32);
        match candidates {
            CandidateCells::All => {
                for cell_id in 0..mesh.num_cells() {
                    builder.add_cell(cell_id);
                }
            }
            CandidateCells::Only(ids) => {
                for &cell_id in ids {
                    if (cell_id as usize) < mesh.num_cells() {
                        builder.add_cell(cell_id as usize);
                    } else {
                        log::warn!("candidate cell {cell_id} is outside the mesh, skipped");
                    }
                }
            }
        }
        Ok(builder.finish())
    }
}

/// Hex corner `b` (bit 0 = +x, bit 1 = +y, bit 2 = +z) as an index into the usual
/// counter-clockwise hexahedron ordering.
const HEX_CORNER: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Corners (in bit order) joined by each marching cubes edge.
const HEX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Accumulates the output surface of one contour pass.
struct SurfaceBuilder<'a> {
    mesh: &'a VolumeMesh,
    scalars: &'a [f32],
    isovalue: f32,
    /// Global point pair (low id first) -> output vertex.
    edge_vertices: HashMap<(u32, u32), u32>,
    points: Vec<Vec3>,
    point_data: AttributeSet,
    cell_data: AttributeSet,
    triangles: Vec<[u32; 3]>,
}

impl<'a> SurfaceBuilder<'a> {
    fn new(mesh: &'a VolumeMesh, scalars: &'a [f32], isovalue: f32) -> Self {
        Self {
            mesh,
            scalars,
            isovalue,
            edge_vertices: HashMap::new(),
            points: Vec::new(),
            point_data: mesh.point_data().empty_like(0),
            cell_data: mesh.cell_data().empty_like(0),
            triangles: Vec::new(),
        }
    }

    fn add_cell(&mut self, cell_id: usize) {
        match self.mesh.cell(cell_id) {
            VolumeCell::Hex(ids) => self.add_hex(cell_id, &ids),
            VolumeCell::Tet(ids) => self.add_tet(cell_id, &ids),
        }
    }

    fn add_hex(&mut self, cell_id: usize, ids: &[u32; 8]) {
        let corners: [u32; 8] = std::array::from_fn(|b| ids[HEX_CORNER[b]]);

        // Build 8-bit configuration index from corner signs
        let mut config_n = 0_usize;
        for (bit, &p) in corners.iter().enumerate() {
            if self.below(p) {
                config_n |= 1 << bit;
            }
        }

        // Skip fully inside or fully outside
        if config_n == 0 || config_n == 255 {
            return;
        }

        let config = MC_TRIS[config_n];
        let n_triangles = (config & 0xF) as usize;
        let mut offset = 4;
        for _ in 0..n_triangles {
            let mut tri = [0_u32; 3];
            for slot in &mut tri {
                let (a, b) = HEX_EDGES[((config >> offset) & 0xF) as usize];
                *slot = self.edge_vertex(corners[a], corners[b]);
                offset += 4;
            }
            self.emit(cell_id, tri);
        }
    }

    fn add_tet(&mut self, cell_id: usize, ids: &[u32; 4]) {
        let below: [bool; 4] = std::array::from_fn(|i| self.below(ids[i]));
        let n_below = below.iter().filter(|&&b| b).count();

        match n_below {
            // No intersection
            0 | 4 => {}
            // One corner separated from the other three: a triangle
            1 | 3 => {
                let lone_is_below = n_below == 1;
                let Some(lone) = below.iter().position(|&b| b == lone_is_below) else {
                    return;
                };
                let mut tri = [0_u32; 3];
                let others = (0..4).filter(|&i| i != lone);
                for (slot, other) in tri.iter_mut().zip(others) {
                    *slot = self.edge_vertex(ids[lone], ids[other]);
                }
                self.emit_oriented(cell_id, ids, &below, tri);
            }
            // Two and two: a quad split into two triangles
            _ => {
                let mut low = (0..4).filter(|&i| below[i]);
                let mut high = (0..4).filter(|&i| !below[i]);
                let (Some(a), Some(b), Some(c), Some(d)) =
                    (low.next(), low.next(), high.next(), high.next())
                else {
                    return;
                };
                let ac = self.edge_vertex(ids[a], ids[c]);
                let ad = self.edge_vertex(ids[a], ids[d]);
                let bd = self.edge_vertex(ids[b], ids[d]);
                let bc = self.edge_vertex(ids[b], ids[c]);
                self.emit_oriented(cell_id, ids, &below, [ac, ad, bd]);
                self.emit_oriented(cell_id, ids, &below, [ac, bd, bc]);
            }
        }
    }

    fn below(&self, point: u32) -> bool {
        self.scalars[point as usize] < self.isovalue
    }

    /// Returns the output vertex where the surface crosses edge `(a, b)`.
    fn edge_vertex(&mut self, a: u32, b: u32) -> u32 {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&v) = self.edge_vertices.get(&key) {
            return v;
        }
        let (lo, hi) = (key.0 as usize, key.1 as usize);
        let va = self.scalars[lo] - self.isovalue;
        let vb = self.scalars[hi] - self.isovalue;
        let t = if (va - vb).abs() > f32::EPSILON * va.abs().max(vb.abs()) {
            (va / (va - vb)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let v = self.points.len() as u32;
        self.points
            .push(self.mesh.point(lo).lerp(self.mesh.point(hi), t));
        self.point_data
            .push_interpolated(self.mesh.point_data(), lo, hi, t);
        self.edge_vertices.insert(key, v);
        v
    }

    fn emit(&mut self, cell_id: usize, tri: [u32; 3]) {
        self.triangles.push(tri);
        self.cell_data.push_tuple_from(self.mesh.cell_data(), cell_id);
    }

    /// Emits `tri` wound so its normal points from the low-valued corners to the high ones.
    fn emit_oriented(&mut self, cell_id: usize, ids: &[u32; 4], below: &[bool; 4], tri: [u32; 3]) {
        let mut low = Vec3::ZERO;
        let mut high = Vec3::ZERO;
        for (i, &id) in ids.iter().enumerate() {
            let p = self.mesh.point(id as usize);
            if below[i] {
                low += p;
            } else {
                high += p;
            }
        }
        let n_low = below.iter().filter(|&&b| b).count() as f32;
        let uphill = high / (4.0 - n_low) - low / n_low;

        let [a, b, c] = tri.map(|v| self.points[v as usize]);
        let normal = (b - a).cross(c - a);
        if normal.dot(uphill) < 0.0 {
            self.emit(cell_id, [tri[0], tri[2], tri[1]]);
        } else {
            self.emit(cell_id, tri);
        }
    }

    fn finish(self) -> PolyData {
        let mut out = PolyData::from_triangles(self.points, &self.triangles);
        out.point_data = self.point_data;
        out.cell_data = self.cell_data;
        out
    }
}

/// Look-up table for triangle configurations (256 entries, one per cube configuration).
///
/// Each entry is a `u64` encoding:
/// - Bits `[3:0]`: Number of triangles (0-5)
/// - Bits `[7:4]`, `[11:8]`, ...: Edge indices (0-11) for each triangle vertex, 4 bits each
///
/// Ported from `MarchingCubeCpp` (public domain).
#[rustfmt::skip]
static MC_TRIS: [u64; 256] = [
    0, 33793, 36945, 159668546,
    18961, 144771090, 5851666, 595283255635,
    20913, 67640146, 193993474, 655980856339,
    88782242, 736732689667, 797430812739, 194554754,
    26657, 104867330, 136709522, 298069416227,
    109224258, 8877909667, 318136408323, 1567994331701604,
    189884450, 350847647843, 559958167731, 3256298596865604,
    447393122899, 651646838401572, 2538311371089956, 737032694307,
    29329, 43484162, 91358498, 374810899075,
    158485010, 178117478419, 88675058979, 433581536604804,
    158486962, 649105605635, 4866906995, 3220959471609924,
    649165714851, 3184943915608436, 570691368417972, 595804498035,
    124295042, 431498018963, 508238522371, 91518530,
    318240155763, 291789778348404, 1830001131721892, 375363605923,
    777781811075, 1136111028516116, 3097834205243396, 508001629971,
    2663607373704004, 680242583802939237, 333380770766129845, 179746658,
    42545, 138437538, 93365810, 713842853011,
    73602098, 69575510115, 23964357683, 868078761575828,
    28681778, 713778574611, 250912709379, 2323825233181284,
    302080811955, 3184439127991172, 1694042660682596, 796909779811,
    176306722, 150327278147, 619854856867, 1005252473234484,
    211025400963, 36712706, 360743481544788, 150627258963,
    117482600995, 1024968212107700, 2535169275963444, 4734473194086550421,
    628107696687956, 9399128243, 5198438490361643573, 194220594,
    104474994, 566996932387, 427920028243, 2014821863433780,
    492093858627, 147361150235284, 2005882975110676, 9671606099636618005,
    777701008947, 3185463219618820, 482784926917540, 2900953068249785909,
    1754182023747364, 4274848857537943333, 13198752741767688709, 2015093490989156,
    591272318771, 2659758091419812, 1531044293118596, 298306479155,
    408509245114388, 210504348563, 9248164405801223541, 91321106,
    2660352816454484, 680170263324308757, 8333659837799955077, 482966828984116,
    4274926723105633605, 3184439197724820, 192104450, 15217,
    45937, 129205250, 129208402, 529245952323,
    169097138, 770695537027, 382310500883, 2838550742137652,
    122763026, 277045793139, 81608128403, 1991870397907988,
    362778151475, 2059003085103236, 2132572377842852, 655681091891,
    58419234, 239280858627, 529092143139, 1568257451898804,
    447235128115, 679678845236084, 2167161349491220, 1554184567314086709,
    165479003923, 1428768988226596, 977710670185060, 10550024711307499077,
    1305410032576132, 11779770265620358997, 333446212255967269, 978168444447012,
    162736434, 35596216627, 138295313843, 891861543990356,
    692616541075, 3151866750863876, 100103641866564, 6572336607016932133,
    215036012883, 726936420696196, 52433666, 82160664963,
    2588613720361524, 5802089162353039525, 214799000387, 144876322,
    668013605731, 110616894681956, 1601657732871812, 430945547955,
    3156382366321172, 7644494644932993285, 3928124806469601813, 3155990846772900,
    339991010498708, 10743689387941597493, 5103845475, 105070898,
    3928064910068824213, 156265010, 1305138421793636, 27185,
    195459938, 567044449971, 382447549283, 2175279159592324,
    443529919251, 195059004769796, 2165424908404116, 1554158691063110021,
    504228368803, 1436350466655236, 27584723588724, 1900945754488837749,
    122971970, 443829749251, 302601798803, 108558722,
    724700725875, 43570095105972, 2295263717447940, 2860446751369014181,
    2165106202149444, 69275726195, 2860543885641537797, 2165106320445780,
    2280890014640004, 11820349930268368933, 8721082628082003989, 127050770,
    503707084675, 122834978, 2538193642857604, 10129,
    801441490467, 2923200302876740, 1443359556281892, 2901063790822564949,
    2728339631923524, 7103874718248233397, 12775311047932294245, 95520290,
    2623783208098404, 1900908618382410757, 137742672547, 2323440239468964,
    362478212387, 727199575803140, 73425410, 34337,
    163101314, 668566030659, 801204361987, 73030562,
    591509145619, 162574594, 100608342969108, 5553,
    724147968595, 1436604830452292, 176259090, 42001,
    143955266, 2385, 18433, 0,
];

#[cfg(test)]
mod tests {
    use super::*;
    use isocomp_core::DataArray;

    fn grid(n: usize) -> VolumeMesh {
        VolumeMesh::uniform([n, n, n], Vec3::ZERO, Vec3::ONE)
    }

    fn contour_all(mesh: &VolumeMesh, field: &[f32], iso: f64) -> PolyData {
        MarchingCells
            .contour_at(mesh, field, iso, CandidateCells::All)
            .unwrap()
    }

    #[test]
    fn test_empty_field() {
        // All values above isoval → no surface
        let mesh = grid(3);
        let surface = contour_all(&mesh, &[1.0; 27], 0.0);
        assert!(surface.is_empty());
        assert_eq!(surface.num_points(), 0);
    }

    #[test]
    fn test_constant_below() {
        // All values below isoval → no surface
        let mesh = grid(3);
        assert!(contour_all(&mesh, &[-1.0; 27], 0.0).is_empty());
    }

    #[test]
    fn test_sphere_sdf() {
        let n = 20_usize;
        let mesh = grid(n);
        let center = Vec3::splat(n as f32 / 2.0);
        let radius = n as f32 / 4.0;
        let field: Vec<f32> = (0..mesh.num_points())
            .map(|i| (mesh.point(i) - center).length() - radius)
            .collect();

        let surface = contour_all(&mesh, &field, 0.0);

        assert!(
            surface.num_cells() > 100,
            "Expected >100 triangles, got {}",
            surface.num_cells()
        );
        surface.validate().unwrap();
        for ids in surface.polys.iter() {
            assert_eq!(ids.len(), 3);
        }
        for p in &surface.points {
            let dist = (*p - center).length();
            assert!(
                (dist - radius).abs() < 1.0,
                "Vertex {p:?} is {dist} from sphere (radius {radius})",
            );
        }
    }

    #[test]
    fn test_single_crossing() {
        // 2x2x2 grid with one corner inside, rest outside
        let mesh = grid(2);
        let mut field = vec![1.0_f32; 8];
        field[0] = -1.0;
        let surface = contour_all(&mesh, &field, 0.0);

        assert_eq!(surface.num_cells(), 1);
        assert_eq!(surface.num_points(), 3);
        for p in &surface.points {
            assert!((p.length() - 0.5).abs() < 1e-6, "{p:?}");
        }
    }

    #[test]
    fn test_tet_triangle_interpolates_point_data() {
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let mut mesh = VolumeMesh::unstructured(points, vec![VolumeCell::Tet([0, 1, 2, 3])]).unwrap();
        mesh.add_point_scalars("s", vec![0.0, 1.0, 1.0, 1.0]).unwrap();
        mesh.add_cell_array(DataArray::scalars("zone", vec![7.0])).unwrap();

        let field = mesh.point_data().get("s").unwrap().values().to_vec();
        let surface = contour_all(&mesh, &field, 0.5);

        assert_eq!(surface.num_cells(), 1);
        assert_eq!(surface.point_data.get("s").unwrap().values(), &[0.5; 3]);
        assert_eq!(surface.cell_data.get("zone").unwrap().values(), &[7.0]);

        // Normal points towards increasing values, away from the origin
        let [a, b, c] = [0, 1, 2].map(|i| surface.points[surface.polys.cell(0)[i] as usize]);
        assert!((b - a).cross(c - a).dot(Vec3::ONE) > 0.0);
    }

    #[test]
    fn test_tet_quad_case() {
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let mesh = VolumeMesh::unstructured(points, vec![VolumeCell::Tet([0, 1, 2, 3])]).unwrap();
        let surface = contour_all(&mesh, &[0.0, 0.0, 1.0, 1.0], 0.5);
        assert_eq!(surface.num_cells(), 2);
        assert_eq!(surface.num_points(), 4);
    }

    #[test]
    fn test_neighbouring_tets_share_edge_vertices() {
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE];
        let cells = vec![VolumeCell::Tet([0, 1, 2, 3]), VolumeCell::Tet([1, 2, 3, 4])];
        let mesh = VolumeMesh::unstructured(points, cells).unwrap();
        let surface = contour_all(&mesh, &[0.0, 0.0, 1.0, 1.0, 1.0], 0.5);
        assert_eq!(surface.num_cells(), 3);
        assert_eq!(surface.num_points(), 5);
    }

    #[test]
    fn test_candidate_cells_restrict_output() {
        let mut mesh = VolumeMesh::uniform([3, 2, 2], Vec3::ZERO, Vec3::ONE);
        mesh.add_cell_array(DataArray::scalars("id", vec![0.0, 1.0])).unwrap();
        // x coordinate as the field: a plane at x = 0.5 crosses cell 0, x = 1.5 cell 1
        let field: Vec<f32> = (0..mesh.num_points()).map(|i| mesh.point(i).x).collect();

        let none = MarchingCells
            .contour_at(&mesh, &field, 1.5, CandidateCells::Only(&[]))
            .unwrap();
        assert!(none.is_empty());

        let only = MarchingCells
            .contour_at(&mesh, &field, 1.5, CandidateCells::Only(&[1]))
            .unwrap();
        assert_eq!(only.num_cells(), 2);
        assert_eq!(only.cell_data.get("id").unwrap().values(), &[1.0, 1.0]);

        let wrong = MarchingCells
            .contour_at(&mesh, &field, 1.5, CandidateCells::Only(&[0]))
            .unwrap();
        assert!(wrong.is_empty());
    }

    #[test]
    fn test_wrong_field_size() {
        let err = MarchingCells
            .contour_at(&grid(3), &[0.0; 10], 0.0, CandidateCells::All)
            .unwrap_err();
        assert!(matches!(
            err,
            IsocompError::SizeMismatch {
                expected: 27,
                actual: 10
            }
        ));
    }
}
