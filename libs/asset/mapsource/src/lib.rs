// Top-level open/query/hit-test API tying the container, subfile,
// geometry, and style layers into one map: open, parse every subfile,
// merge their metadata, then expose a small query surface rather than
// handing callers the container/subfile internals directly.

use container::{ContainerReader, PartType};
use geometry::{decode_line, decode_line2, decode_point, decode_point2, Line, LineKind, Point};
use img_error::{garmin_rad, ImgError, Rect, Result};
use label::{LabelTable, LookupTarget};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subfile::{MapLevel, SubfileReader, Subdivision};
use typ::TypStyler;

/// Cooperative cancellation flag, checked between subfiles and between
/// subdivisions during `query` (spec.md §5's concurrency model). Cloning
/// shares the same underlying flag, so a host can hold one handle and
/// flip it from another thread while `query` runs.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Small options struct passed to `MapSource::open`. Plain struct with a
/// sensible `Default` rather than a `structopt`/`clap`-derived one, since
/// there is no command line here to parse.
#[derive(Debug, Clone, Default)]
pub struct MapSourceOpts {
    /// Added to `ScaleResolver`'s table lookup before clamping, matching
    /// the reference decoder's `getAdjustDetailLevel()`. Kept on the map
    /// (not threaded through every `query` call) since the original bakes
    /// it into `scale2bits` as a per-map setting, not a per-call one.
    pub detail_adjust: i32,
    pub typ_path: Option<PathBuf>,
}

/// A position in the Garmin radian convention (spec.md §6); `lng`/`lat`
/// are already the result of `GARMIN_RAD`, not raw Garmin units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone)]
pub struct ScenePoint {
    pub position: GeoPoint,
    pub feature_type: u16,
    pub subtype: u8,
    pub is_poi: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScenePolyline {
    pub feature_type: u16,
    pub points: Vec<GeoPoint>,
    pub labels: Vec<String>,
    pub direction: bool,
}

#[derive(Debug, Clone)]
pub struct ScenePolygon {
    pub feature_type: u16,
    pub points: Vec<GeoPoint>,
    pub labels: Vec<String>,
}

/// The result of one `query`: four arrays in document order (subfile,
/// then subdivision, then record), per spec.md §5's ordering guarantee.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub polygons: Vec<ScenePolygon>,
    pub polylines: Vec<ScenePolyline>,
    pub points: Vec<ScenePoint>,
    pub pois: Vec<ScenePoint>,
}

struct LoadedSubfile {
    name: String,
    reader: SubfileReader,
}

/// Owns the memory-mapped container plus one parsed `SubfileReader` per
/// valid subfile. `query` re-reads each subfile's RGN bytes from the
/// container on demand rather than caching them, since per spec.md §5
/// the scene arrays belong to the caller, not to `MapSource`.
pub struct MapSource {
    container: ContainerReader,
    subfiles: Vec<LoadedSubfile>,
    area: Rect,
    copyright: String,
    styler: TypStyler,
    opts: MapSourceOpts,
}

impl MapSource {
    pub fn open(path: &Path, opts: MapSourceOpts) -> Result<Self> {
        let container = ContainerReader::open(path)?;

        let mut area: Option<Rect> = None;
        let mut copyrights: Vec<String> = Vec::new();
        let mut subfiles = Vec::new();

        let names: Vec<String> = container.subfiles.keys().cloned().collect();
        for name in names {
            let tre = match container.read_part(&name, PartType::Tre) {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!("subfile {name}: failed to read TRE part, skipping ({e})");
                    continue;
                }
                None => continue,
            };
            let rgn = match container.read_part(&name, PartType::Rgn) {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!("subfile {name}: failed to read RGN part, skipping ({e})");
                    continue;
                }
                None => continue,
            };
            let lbl = match container.read_part(&name, PartType::Lbl) {
                Some(Ok(bytes)) => Some(bytes),
                Some(Err(e)) => {
                    warn!("subfile {name}: failed to read LBL part, continuing without labels ({e})");
                    None
                }
                None => None,
            };
            let net = match container.read_part(&name, PartType::Net) {
                Some(Ok(bytes)) => Some(bytes),
                Some(Err(e)) => {
                    warn!("subfile {name}: failed to read NET part, continuing without labels ({e})");
                    None
                }
                None => None,
            };

            let reader = match SubfileReader::read(tre, rgn, lbl, net) {
                Ok(r) => r,
                Err(e) => {
                    warn!("subfile {name}: failed to parse, skipping ({e})");
                    continue;
                }
            };

            area = Some(match area {
                Some(a) => a.merge(&reader.bounds),
                None => reader.bounds,
            });
            if !reader.copyright.is_empty() && !copyrights.contains(&reader.copyright) {
                copyrights.push(reader.copyright.clone());
            }

            subfiles.push(LoadedSubfile { name, reader });
        }

        let styler = match &opts.typ_path {
            Some(p) => TypStyler::from_bytes(&std::fs::read(p)?)?,
            None => TypStyler::with_fallback(),
        };

        debug!(
            "opened {}: {} valid subfile(s), area={:?}",
            path.display(),
            subfiles.len(),
            area
        );

        Ok(MapSource {
            container,
            subfiles,
            area: area.unwrap_or_else(Rect::full_world),
            copyright: copyrights.join("; "),
            styler,
            opts,
        })
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn copyright(&self) -> &str {
        &self.copyright
    }

    /// The union of every subfile's map levels, deduped by `bits` and
    /// sorted ascending — the "combined maplevels of all tiles" the
    /// reference decoder assembles once at open time.
    pub fn map_levels(&self) -> Vec<MapLevel> {
        let mut levels: Vec<MapLevel> = Vec::new();
        for sf in &self.subfiles {
            for lvl in &sf.reader.map_levels {
                if !levels.iter().any(|l| l.bits == lvl.bits) {
                    levels.push(*lvl);
                }
            }
        }
        levels.sort_by_key(|l| l.bits);
        levels
    }

    pub fn set_typ_file(&mut self, path: Option<&Path>) -> Result<()> {
        self.styler = match path {
            Some(p) => TypStyler::from_bytes(&std::fs::read(p)?)?,
            None => TypStyler::with_fallback(),
        };
        Ok(())
    }

    pub fn styler(&self) -> &TypStyler {
        &self.styler
    }

    /// Implements spec.md §4.7's five-step `query`: pick the deepest map
    /// level the current scale affords, walk every subfile/subdivision
    /// that intersects `viewport`, decode their RGN windows, attach
    /// labels, and hand back the four record arrays. Returns whatever
    /// was collected so far if `cancel` is observed mid-way.
    pub fn query(&self, viewport: Rect, scale_mpp: f64, cancel: &CancelToken) -> Scene {
        let zoom_bits = ScaleResolver::bits_for_scale(scale_mpp, self.opts.detail_adjust);
        let levels = self.map_levels();
        let mut scene = Scene::default();

        let Some(chosen_level) = pick_level(&levels, zoom_bits) else {
            return scene;
        };

        for sf in &self.subfiles {
            if cancel.is_cancelled() {
                break;
            }
            if !sf.reader.bounds.intersects(&viewport) {
                continue;
            }
            let rgn = match self.container.read_part(&sf.name, PartType::Rgn) {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!("subfile {}: failed to re-read RGN part during query: {e}", sf.name);
                    continue;
                }
                None => continue,
            };

            for subdiv in &sf.reader.subdivisions {
                if cancel.is_cancelled() {
                    break;
                }
                if subdiv.level != chosen_level || !subdiv.rect().intersects(&viewport) {
                    continue;
                }
                decode_subdivision(rgn, subdiv, &viewport, &sf.reader.labels, &mut scene);
            }
        }

        scene
    }
}

/// Walks `levels` (ascending by `bits`) from the deepest level backward,
/// keeping the first whose `bits` requirement the given zoom clears;
/// falls back to the coarsest level if none do. Mirrors the reference
/// decoder's reverse-iterate-until-break selection in `CMapIMG::draw`.
fn pick_level(levels: &[MapLevel], zoom_bits: u8) -> Option<u8> {
    levels
        .iter()
        .rev()
        .find(|l| zoom_bits >= l.bits)
        .or_else(|| levels.first())
        .map(|l| l.level)
}

/// Maps a scale (meters per screen pixel) to a subdivision bit-depth.
pub struct ScaleResolver;

impl ScaleResolver {
    /// The reference decoder's `scale2bits` threshold table, verbatim.
    const THRESHOLDS: [(f64, u8); 22] = [
        (70000.0, 2),
        (50000.0, 3),
        (30000.0, 4),
        (20000.0, 5),
        (15000.0, 6),
        (10000.0, 7),
        (7000.0, 8),
        (5000.0, 9),
        (3000.0, 10),
        (2000.0, 11),
        (1500.0, 12),
        (1000.0, 13),
        (700.0, 14),
        (500.0, 15),
        (300.0, 16),
        (200.0, 17),
        (100.0, 18),
        (70.0, 19),
        (30.0, 20),
        (15.0, 21),
        (7.0, 22),
        (3.0, 23),
    ];

    /// Walks the table in descending-scale order, keeping the first
    /// (coarsest) threshold the scale still clears; scales below the
    /// finest threshold default to 24. The detail adjustment is folded
    /// in afterward, then the result is clamped to `[2, 24]`.
    pub fn bits_for_scale(scale_mpp: f64, detail_adjust: i32) -> u8 {
        let mut bits: i32 = 24;
        for &(threshold, b) in &Self::THRESHOLDS {
            if scale_mpp >= threshold {
                bits = b as i32;
                break;
            }
        }
        (bits + detail_adjust).clamp(2, 24) as u8
    }
}

fn need(data: &[u8], at: usize, len: usize, what: &'static str) -> Result<()> {
    if data.len() < at + len {
        return Err(ImgError::Truncated(format!(
            "{what}: need {len} bytes at {at}, have {}",
            data.len()
        )));
    }
    Ok(())
}

/// Derives the four geometry-class byte offsets inside one subdivision's
/// RGN window: `objCnt - 1` 16-bit entries sit right after `rgn_start`,
/// one per present kind past the first, each holding the offset of the
/// *next* kind's data (the current kind's offset is whatever position
/// reading has reached). Mirrors `CMapIMG::loadSubDiv`'s `opnt`/`oidx`/
/// `opline`/`opgon` derivation exactly, including its "derive by
/// arithmetic when nothing has been read from the table yet" quirk.
fn subdivision_offsets(rgn: &[u8], subdiv: &Subdivision) -> Result<(u32, u32, u32, u32)> {
    let obj_cnt = subdiv.has_points as u32
        + subdiv.has_idx_points as u32
        + subdiv.has_polylines as u32
        + subdiv.has_polygons as u32;
    let mut cursor = subdiv.rgn_start;
    let mut opnt = 0u32;
    let mut oidx = 0u32;
    let mut opline = 0u32;
    let mut opgon = 0u32;

    let read_u16_at = |at: u32| -> Result<u32> {
        need(rgn, at as usize, 2, "subdivision offset table entry")?;
        Ok(u32::from(u16::from_le_bytes([rgn[at as usize], rgn[at as usize + 1]])))
    };

    if subdiv.has_points {
        opnt = (obj_cnt - 1) * 2 + subdiv.rgn_start;
    }
    if subdiv.has_idx_points {
        if opnt != 0 {
            oidx = read_u16_at(cursor)? + subdiv.rgn_start;
            cursor += 2;
        } else {
            oidx = (obj_cnt - 1) * 2 + subdiv.rgn_start;
        }
    }
    if subdiv.has_polylines {
        if opnt != 0 || oidx != 0 {
            opline = read_u16_at(cursor)? + subdiv.rgn_start;
            cursor += 2;
        } else {
            opline = (obj_cnt - 1) * 2 + subdiv.rgn_start;
        }
    }
    if subdiv.has_polygons {
        if opnt != 0 || oidx != 0 || opline != 0 {
            opgon = read_u16_at(cursor)? + subdiv.rgn_start;
        } else {
            opgon = (obj_cnt - 1) * 2 + subdiv.rgn_start;
        }
    }

    Ok((opnt, oidx, opline, opgon))
}

fn decode_points_in_range(
    rgn: &[u8],
    start: u32,
    end: u32,
    subdiv: &Subdivision,
    viewport: &Rect,
    labels: &LabelTable,
    extended: bool,
) -> Vec<ScenePoint> {
    let mut out = Vec::new();
    let end = (end as usize).min(rgn.len());
    let mut pos = start as usize;
    if pos > end {
        return out;
    }

    while pos < end {
        let window = &rgn[pos..end];
        let decoded = if extended {
            decode_point2(window, subdiv.center_lng, subdiv.center_lat, subdiv.shift)
        } else {
            decode_point(window, subdiv.center_lng, subdiv.center_lat, subdiv.shift)
        };
        let (consumed, point): (usize, Point) = match decoded {
            Ok(v) => v,
            Err(e) => {
                warn!("discarding malformed point record: {e}");
                break;
            }
        };
        if consumed == 0 {
            break;
        }
        pos += consumed;

        let position = GeoPoint {
            lng: garmin_rad(point.lng),
            lat: garmin_rad(point.lat),
        };
        if !viewport.contains_point(position.lng, position.lat) {
            continue;
        }

        let record_labels = if point.lbl_ptr != 0 || point.is_lbl6 {
            let target = if point.is_lbl6 { LookupTarget::Lbl6 } else { LookupTarget::Lbl1 };
            labels.get(point.lbl_ptr, target).unwrap_or_default()
        } else {
            Vec::new()
        };

        out.push(ScenePoint {
            position,
            feature_type: point.kind,
            subtype: point.subtype,
            is_poi: false,
            labels: record_labels,
        });
    }
    out
}

/// Bounding rect of a record's vertex list, in Garmin units converted to
/// radians. Used to reject records entirely outside the viewport
/// (spec.md §4.7 step 3), standing in for the original's pixel-space
/// `isCompletelyOutside` check.
fn record_bounds(points: &[(i32, i32)]) -> Rect {
    let mut min_lng = i32::MAX;
    let mut max_lng = i32::MIN;
    let mut min_lat = i32::MAX;
    let mut max_lat = i32::MIN;
    for &(lng, lat) in points {
        min_lng = min_lng.min(lng);
        max_lng = max_lng.max(lng);
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
    }
    Rect::new(
        garmin_rad(max_lat),
        garmin_rad(min_lat),
        garmin_rad(max_lng),
        garmin_rad(min_lng),
    )
    .normalized()
}

#[allow(clippy::too_many_arguments)]
fn decode_lines_in_range(
    rgn: &[u8],
    start: u32,
    end: u32,
    subdiv: &Subdivision,
    viewport: &Rect,
    labels: &LabelTable,
    line_kind: LineKind,
    extended: bool,
) -> Vec<Line> {
    let mut out = Vec::new();
    let end = (end as usize).min(rgn.len());
    let mut pos = start as usize;
    if pos > end {
        return out;
    }

    while pos < end {
        let window = &rgn[pos..end];
        let decoded = if extended {
            decode_line2(window, subdiv.center_lng, subdiv.center_lat, subdiv.shift)
        } else {
            decode_line(line_kind, window, subdiv.center_lng, subdiv.center_lat, subdiv.shift)
        };
        let (consumed, mut line) = match decoded {
            Ok(v) => v,
            Err(e) => {
                warn!("discarding malformed {line_kind:?} record: {e}");
                break;
            }
        };
        if consumed == 0 {
            break;
        }
        pos += consumed;

        if !record_bounds(&line.points).intersects(viewport) {
            continue;
        }

        if line.lbl_info != 0 {
            let target = if line.lbl_in_net { LookupTarget::Net1 } else { LookupTarget::Lbl1 };
            line.labels = labels.get(line.lbl_info, target).unwrap_or_default();
        }
        out.push(line);
    }
    out
}

fn to_geo_points(points: &[(i32, i32)]) -> Vec<GeoPoint> {
    points
        .iter()
        .map(|&(lng, lat)| GeoPoint {
            lng: garmin_rad(lng),
            lat: garmin_rad(lat),
        })
        .collect()
}

fn decode_subdivision(
    rgn: &[u8],
    subdiv: &Subdivision,
    viewport: &Rect,
    labels: &LabelTable,
    scene: &mut Scene,
) {
    if subdiv.rgn_start == subdiv.rgn_end
        && subdiv.length_polygons2 == 0
        && subdiv.length_polylines2 == 0
        && subdiv.length_points2 == 0
    {
        return;
    }

    let (opnt, oidx, opline, opgon) = match subdivision_offsets(rgn, subdiv) {
        Ok(v) => v,
        Err(e) => {
            warn!("subdivision at {:#x}: offset table: {e}", subdiv.rgn_start);
            return;
        }
    };

    if subdiv.has_points {
        let end = [oidx, opline, opgon].into_iter().find(|&v| v != 0).unwrap_or(subdiv.rgn_end);
        for point in decode_points_in_range(rgn, opnt, end, subdiv, viewport, labels, false) {
            scene.points.push(point);
        }
    }
    if subdiv.has_idx_points {
        let end = [opline, opgon].into_iter().find(|&v| v != 0).unwrap_or(subdiv.rgn_end);
        for mut point in decode_points_in_range(rgn, oidx, end, subdiv, viewport, labels, false) {
            point.is_poi = true;
            scene.pois.push(point);
        }
    }
    if subdiv.has_polylines {
        let end = if opgon != 0 { opgon } else { subdiv.rgn_end };
        for line in decode_lines_in_range(rgn, opline, end, subdiv, viewport, labels, LineKind::Polyline, false) {
            scene.polylines.push(ScenePolyline {
                feature_type: line.kind,
                points: to_geo_points(&line.points),
                labels: line.labels,
                direction: line.direction,
            });
        }
    }
    if subdiv.has_polygons {
        for line in decode_lines_in_range(rgn, opgon, subdiv.rgn_end, subdiv, viewport, labels, LineKind::Polygon, false) {
            scene.polygons.push(ScenePolygon {
                feature_type: line.kind,
                points: to_geo_points(&line.points),
                labels: line.labels,
            });
        }
    }

    if subdiv.length_polygons2 > 0 {
        let end = subdiv.offset_polygons2 + subdiv.length_polygons2;
        for line in decode_lines_in_range(
            rgn,
            subdiv.offset_polygons2,
            end,
            subdiv,
            viewport,
            labels,
            LineKind::Polygon,
            true,
        ) {
            scene.polygons.push(ScenePolygon {
                feature_type: line.kind,
                points: to_geo_points(&line.points),
                labels: line.labels,
            });
        }
    }
    if subdiv.length_polylines2 > 0 {
        let end = subdiv.offset_polylines2 + subdiv.length_polylines2;
        for line in decode_lines_in_range(
            rgn,
            subdiv.offset_polylines2,
            end,
            subdiv,
            viewport,
            labels,
            LineKind::Polyline,
            true,
        ) {
            scene.polylines.push(ScenePolyline {
                feature_type: line.kind,
                points: to_geo_points(&line.points),
                labels: line.labels,
                direction: line.direction,
            });
        }
    }
    if subdiv.length_points2 > 0 {
        let end = subdiv.offset_points2 + subdiv.length_points2;
        for point in decode_points_in_range(rgn, subdiv.offset_points2, end, subdiv, viewport, labels, true) {
            scene.points.push(point);
        }
    }
}

/// A minimal linear viewport-to-pixel mapping, not a real map projection
/// (Mercator, ellipsoidal, ...) — those are out of scope here. It exists
/// purely so the pixel-space hit-test API (`find_poi`/`info_at`/
/// `find_polyline_near`) has something to test `px` arguments against.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub viewport: Rect,
    pub width_px: f64,
    pub height_px: f64,
}

impl Projection {
    pub fn to_px(&self, p: GeoPoint) -> (f64, f64) {
        let wraps = self.viewport.east < self.viewport.west;
        let two_pi = std::f64::consts::PI * 2.0;
        let lng_span = if wraps {
            self.viewport.east + two_pi - self.viewport.west
        } else {
            self.viewport.east - self.viewport.west
        };
        let mut lng = p.lng;
        if wraps && lng < self.viewport.west {
            lng += two_pi;
        }
        let x = if lng_span.abs() > f64::EPSILON {
            (lng - self.viewport.west) / lng_span * self.width_px
        } else {
            0.0
        };
        let lat_span = self.viewport.north - self.viewport.south;
        let y = if lat_span.abs() > f64::EPSILON {
            (self.viewport.north - p.lat) / lat_span * self.height_px
        } else {
            0.0
        };
        (x, y)
    }
}

/// Hit-testing over one already-queried `Scene`, in pixel space per
/// `Projection`. Grounded on `CMapIMG::findPOICloseBy`/`getInfoPolylines`/
/// `getInfoPolygons`/`findPolylineCloseBy`.
pub struct Queries<'a> {
    scene: &'a Scene,
    projection: &'a Projection,
    styler: &'a TypStyler,
}

#[derive(Debug, Clone)]
pub struct PoiHit {
    pub position: GeoPoint,
    pub name: String,
    pub description: String,
}

impl<'a> Queries<'a> {
    pub fn new(scene: &'a Scene, projection: &'a Projection, styler: &'a TypStyler) -> Self {
        Self {
            scene,
            projection,
            styler,
        }
    }

    fn point_fallback_name(&self, feature_type: u16) -> String {
        self.styler
            .point_properties
            .get(&feature_type)
            .and_then(|p| p.strings.get(&0))
            .cloned()
            .unwrap_or_else(|| format!(" ({feature_type:02x})"))
    }

    /// Manhattan distance < 10px; first hit across points then POIs wins.
    pub fn find_poi(&self, px: (f64, f64)) -> Option<PoiHit> {
        for list in [&self.scene.points, &self.scene.pois] {
            for point in list {
                let (x, y) = self.projection.to_px(point.position);
                if (px.0 - x).abs() + (px.1 - y).abs() < 10.0 {
                    let name = point
                        .labels
                        .first()
                        .cloned()
                        .unwrap_or_else(|| self.point_fallback_name(point.feature_type));
                    return Some(PoiHit {
                        position: point.position,
                        name,
                        description: point.labels.join(" "),
                    });
                }
            }
        }
        None
    }

    /// Checks points/POIs, then polylines, then (only if nothing matched)
    /// polygons under `px`, in that priority order.
    pub fn info_at(&self, px: (f64, f64)) -> HashMap<String, String> {
        let mut dict = self.info_points(px);
        if dict.is_empty() {
            dict = self.info_polylines(px);
        }
        if dict.is_empty() {
            dict = self.info_polygons(px);
        }
        dict
    }

    fn info_points(&self, px: (f64, f64)) -> HashMap<String, String> {
        let mut dict = HashMap::new();
        for list in [&self.scene.points, &self.scene.pois] {
            for point in list {
                let (x, y) = self.projection.to_px(point.position);
                if (px.0 - x).abs() + (px.1 - y).abs() < 10.0 {
                    let value = if !point.labels.is_empty() {
                        point.labels.join(" ")
                    } else {
                        self.point_fallback_name(point.feature_type)
                    };
                    dict.insert("Point of Interest".to_string(), value);
                }
            }
        }
        dict
    }

    /// Parametric projection of `px` onto each segment (the Paul Bourke
    /// point-to-line method); the smallest perpendicular distance wins,
    /// ties accumulate labels.
    fn info_polylines(&self, px: (f64, f64)) -> HashMap<String, String> {
        let mut shortest = 20.0f64;
        let mut found = false;
        let mut feature_type = 0u16;
        let mut values: Vec<String> = Vec::new();

        for line in &self.scene.polylines {
            if line.points.len() < 2 {
                continue;
            }
            let pixels: Vec<(f64, f64)> = line.points.iter().map(|&p| self.projection.to_px(p)).collect();
            for w in pixels.windows(2) {
                let (p1, p2) = (w[0], w[1]);
                let dx = p2.0 - p1.0;
                let dy = p2.1 - p1.1;
                let len_sq = dx * dx + dy * dy;
                if len_sq == 0.0 {
                    continue;
                }
                let u = ((px.0 - p1.0) * dx + (px.1 - p1.1) * dy) / len_sq;
                if !(0.0..=1.0).contains(&u) {
                    continue;
                }
                let x = p1.0 + u * dx;
                let y = p1.1 + u * dy;
                let distance = ((x - px.0).powi(2) + (y - px.1).powi(2)).sqrt();
                if distance < shortest {
                    feature_type = line.feature_type;
                    values.clear();
                    values.push(if !line.labels.is_empty() { line.labels.join(" ") } else { "-".to_string() });
                    shortest = distance;
                    found = true;
                } else if (distance - shortest).abs() < f64::EPSILON && !line.labels.is_empty() {
                    values.push(line.labels.join(" "));
                }
            }
        }

        let mut dict = HashMap::new();
        if !found {
            return dict;
        }
        values.dedup();
        let label = self
            .styler
            .polyline_properties
            .get(&feature_type)
            .and_then(|s| s.strings.get(&0))
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        dict.insert(format!("{label}({feature_type:02x})"), values.join("\n"));
        dict
    }

    /// Ray-casting point-in-polygon (odd crossings); requires more than
    /// two vertices.
    fn info_polygons(&self, px: (f64, f64)) -> HashMap<String, String> {
        let mut dict = HashMap::new();
        for poly in &self.scene.polygons {
            if poly.points.len() <= 2 {
                continue;
            }
            let pixels: Vec<(f64, f64)> = poly.points.iter().map(|&p| self.projection.to_px(p)).collect();
            if !point_in_polygon(px, &pixels) {
                continue;
            }
            let value = if !poly.labels.is_empty() {
                poly.labels.join(" ")
            } else {
                self.styler
                    .polygon_properties
                    .get(&poly.feature_type)
                    .and_then(|s| s.strings.get(&0))
                    .cloned()
                    .unwrap_or_default()
            };
            if !value.is_empty() {
                dict.insert("Area".to_string(), value);
            }
        }
        dict
    }

    /// A polyline matches iff both endpoints of the probe segment lie
    /// within `threshold` pixels of it; the best match minimizes the
    /// larger of the two distances. Contour lines (0x20..=0x25) are
    /// excluded.
    pub fn find_polyline_near(&self, pt1: (f64, f64), pt2: (f64, f64), threshold: f64) -> Option<ScenePolyline> {
        let mut best: Option<(f64, ScenePolyline)> = None;
        for line in &self.scene.polylines {
            if line.points.len() < 2 {
                continue;
            }
            if (0x20..=0x25).contains(&line.feature_type) {
                continue;
            }
            let pixels: Vec<(f64, f64)> = line.points.iter().map(|&p| self.projection.to_px(p)).collect();
            let dist1 = distance_point_to_polyline(pt1, &pixels);
            let dist2 = distance_point_to_polyline(pt2, &pixels);
            if dist1 < threshold && dist2 < threshold {
                let worse = dist1.max(dist2);
                if best.as_ref().map(|(d, _)| worse < *d).unwrap_or(true) {
                    best = Some((worse, line.clone()));
                }
            }
        }
        best.map(|(_, line)| line)
    }
}

fn point_in_polygon(pt: (f64, f64), poly: &[(f64, f64)]) -> bool {
    let (x, y) = pt;
    let n = poly.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = poly[i];
        let (xj, yj) = poly[j];
        if ((yi <= y) && (y < yj)) || ((yj <= y) && (y < yi)) {
            if x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn distance_point_to_polyline(pt: (f64, f64), polyline: &[(f64, f64)]) -> f64 {
    let mut best = f64::MAX;
    for w in polyline.windows(2) {
        let (p1, p2) = (w[0], w[1]);
        let dx = p2.0 - p1.0;
        let dy = p2.1 - p1.1;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq > 0.0 {
            (((pt.0 - p1.0) * dx + (pt.1 - p1.1) * dy) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let x = p1.0 + t * dx;
        let y = p1.1 + t * dy;
        let d = ((x - pt.0).powi(2) + (y - pt.1).powi(2)).sqrt();
        if d < best {
            best = d;
        }
    }
    best
}
