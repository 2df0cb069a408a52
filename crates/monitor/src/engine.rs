//! In-process imagery engine
//!
//! Runs the whole per-month chain locally over a [`SceneCatalog`]:
//! quality masking, NDVI, per-pixel median, region reduction and, for
//! frames, true-colour rendering with the vegetation overlay and AOI
//! outline.

use tracing::{debug, warn};
use vegmon_algorithms::composite::median_composite;
use vegmon_algorithms::imagery::{
    apply_mask, clear_mask, ndvi, positive_mask, threshold_mask, QualityRule,
};
use vegmon_algorithms::maybe_rayon::*;
use vegmon_algorithms::statistics::{plan_region_grid, reduce_region, ReductionOptions};
use vegmon_colormap::{render_mask, stretch_rgb};
use vegmon_core::{GridSpec, Raster};

use crate::catalog::{count_acquisitions, distinct_scenes, Band, Scene, SceneCatalog, SceneQuery};
use crate::error::Result;
use crate::service::{FrameRequest, ImageryService, MonthReduction, MonthlyReduction, RenderedFrame};
use crate::window::MonthInterval;

/// Scene with the masks that decide which of its pixels are usable
struct MaskedScene<'s> {
    scene: &'s Scene,
    masks: Vec<Raster<u8>>,
}

/// [`ImageryService`] computing everything from catalog band reads
#[derive(Debug, Clone)]
pub struct RasterEngine<C> {
    catalog: C,
}

impl<C: SceneCatalog> RasterEngine<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Distinct scenes of the request's month over the AOI
    fn scenes(&self, request: &MonthlyReduction<'_>) -> Result<Vec<Scene>> {
        let query = SceneQuery {
            interval: MonthInterval::of(request.month)?,
            bbox: request.aoi.bbox(),
            max_cloud_percent: request.max_cloud_percent,
        };
        Ok(distinct_scenes(self.catalog.search(&query)?))
    }

    /// Usability masks of `scene` on `grid` and its NDVI with unusable
    /// pixels set to NaN.
    ///
    /// A pixel is usable when red and NIR are both positive and the quality
    /// band (when the scene has one) passes `quality`.
    fn mask_scene<'s>(
        &self,
        scene: &'s Scene,
        grid: &GridSpec,
        quality: &QualityRule,
    ) -> Result<(MaskedScene<'s>, Raster<f64>)> {
        let red = self.catalog.read_band(scene, Band::Red, grid)?;
        let nir = self.catalog.read_band(scene, Band::Nir, grid)?;

        let mut masks = vec![positive_mask(&[&red, &nir])?];
        if scene.has_band(Band::Quality) {
            let qa = self.catalog.read_band(scene, Band::Quality, grid)?;
            masks.push(clear_mask(&qa, quality)?);
        } else {
            warn!(scene = %scene.product_id, "no quality band, cloud mask skipped");
        }

        let mut index = ndvi(&nir, &red)?;
        for mask in &masks {
            apply_mask(&mut index, mask)?;
        }
        Ok((MaskedScene { scene, masks }, index))
    }

    fn masked_band(&self, masked: &MaskedScene<'_>, band: Band, grid: &GridSpec) -> Result<Raster<f64>> {
        let mut raster = self.catalog.read_band(masked.scene, band, grid)?;
        for mask in &masked.masks {
            apply_mask(&mut raster, mask)?;
        }
        Ok(raster)
    }

    /// Per-pixel medians across `scenes`: one per entry of `bands`, then
    /// the NDVI median last.
    ///
    /// Only one band's stack of scene layers is held at a time; between
    /// bands each scene keeps just its `u8` masks.
    fn composites(
        &self,
        scenes: &[Scene],
        grid: &GridSpec,
        quality: &QualityRule,
        bands: &[Band],
    ) -> Result<Vec<Raster<f64>>> {
        let (masked, stack): (Vec<MaskedScene<'_>>, Vec<Raster<f64>>) = scenes
            .into_par_iter()
            .map(|scene| self.mask_scene(scene, grid, quality))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        let index = median_composite(&stack, grid)?;
        drop(stack);

        let mut out = Vec::with_capacity(bands.len() + 1);
        for &band in bands {
            let stack = masked
                .as_slice()
                .into_par_iter()
                .map(|m| self.masked_band(m, band, grid))
                .collect::<Result<Vec<_>>>()?;
            out.push(median_composite(&stack, grid)?);
        }
        out.push(index);
        Ok(out)
    }

    /// Reduce the month over the AOI using an already selected scene list
    fn reduce_scenes(&self, request: &MonthlyReduction<'_>, scenes: &[Scene]) -> Result<MonthReduction> {
        let n_scenes = count_acquisitions(scenes);

        let plan = plan_region_grid(&request.aoi.bbox(), &request.options)?;
        if plan.coarsening > 1 {
            warn!(
                month = %request.label(),
                requested_m = request.options.scale_m,
                scale_m = plan.scale_m,
                "analysis grid coarsened to fit max_pixels"
            );
        }
        let region = request.aoi.rasterize(&plan.grid)?;

        let mut composite = self
            .composites(scenes, &plan.grid, request.quality, &[])?
            .pop()
            .unwrap_or_else(|| Raster::on_grid(&plan.grid, f64::NAN));
        apply_mask(&mut composite, &region)?;

        let stats = reduce_region(
            &composite,
            &region,
            &plan.grid,
            request.threshold,
            request.options.tile_scale,
        )?;
        debug!(
            month = %request.label(),
            scenes = scenes.len(),
            n_scenes,
            region_pixels = stats.region_pixels,
            valid_pixels = stats.valid_pixels,
            above_pixels = stats.above_pixels,
            "month reduced"
        );

        Ok(MonthReduction {
            month: request.month,
            n_scenes,
            area_m2: stats.area_m2,
            valid_frac: stats.valid_frac,
            scale_m: plan.scale_m,
        })
    }
}

impl<C: SceneCatalog> ImageryService for RasterEngine<C> {
    fn reduce_month(&self, request: &MonthlyReduction<'_>) -> Result<MonthReduction> {
        let scenes = self.scenes(request)?;
        self.reduce_scenes(request, &scenes)
    }

    fn render_frame(&self, request: &FrameRequest<'_>) -> Result<RenderedFrame> {
        let reduction = &request.reduction;
        let scenes = self.scenes(reduction)?;
        let stats = self.reduce_scenes(reduction, &scenes)?;

        let options = ReductionOptions {
            scale_m: request.scale_m,
            ..reduction.options
        };
        let extent = reduction.aoi.buffered_bounds(request.buffer_m);
        let grid = plan_region_grid(&extent, &options)?.grid;

        let mut layers = self
            .composites(
                &scenes,
                &grid,
                reduction.quality,
                &[Band::Red, Band::Green, Band::Blue],
            )?
            .into_iter();
        let mut next = || layers.next().unwrap_or_else(|| Raster::on_grid(&grid, f64::NAN));
        let (red, green, blue, mut index) = (next(), next(), next(), next());
        // overlay only inside the AOI; true colour keeps the buffered extent
        apply_mask(&mut index, &reduction.aoi.rasterize(&grid)?)?;

        let style = &request.style;
        let mut image = stretch_rgb(&red, &green, &blue, &style.stretch())?;
        let vegetation = threshold_mask(&index, reduction.threshold)?;
        image.blend_over(&render_mask(
            &vegetation,
            style.overlay_color,
            style.overlay_opacity,
        )?)?;
        let outline = reduction.aoi.outline(&grid, style.outline_width_px)?;
        image.blend_over(&render_mask(&outline, style.outline_color, 1.0)?)?;

        debug!(
            month = %reduction.label(),
            width = grid.cols,
            height = grid.rows,
            scenes = scenes.len(),
            "frame rendered"
        );

        Ok(RenderedFrame {
            month: reduction.month,
            image,
            grid,
            area_m2: stats.area_m2,
            n_scenes: stats.n_scenes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use vegmon_core::{BBox, GeoTransform, CRS};

    fn band(value: f64) -> Raster<f64> {
        let mut raster = Raster::filled(100, 120, value);
        raster.set_transform(GeoTransform::new(-74.70, 10.95, 0.0025, -0.0025));
        raster.set_crs(Some(CRS::wgs84()));
        raster
    }

    fn scene(product: &str, day: u32) -> Scene {
        Scene {
            product_id: product.to_string(),
            datatake_id: None,
            acquired: Utc.with_ymd_and_hms(2025, 6, day, 15, 30, 0).unwrap(),
            cloud_percent: 5.0,
            footprint: BBox::new(-75.0, 10.5, -74.0, 11.5),
            crs: CRS::wgs84(),
            assets: HashMap::new(),
            collection: None,
        }
    }

    fn bands(green: f64, blue: f64, scl: f64) -> Vec<(Band, Raster<f64>)> {
        vec![
            (Band::Red, band(400.0)),
            (Band::Nir, band(3200.0)),
            (Band::Green, band(green)),
            (Band::Blue, band(blue)),
            (Band::Quality, band(scl)),
        ]
    }

    #[test]
    fn band_composites_share_the_scene_masks() {
        let catalog = InMemoryCatalog::new()
            .with_scene(scene("A", 3), bands(800.0, 600.0, 4.0))
            .with_scene(scene("B", 13), bands(1000.0, 900.0, 4.0))
            // cloud class: none of its bands may reach the medians
            .with_scene(scene("C", 23), bands(5000.0, 5000.0, 9.0));
        let engine = RasterEngine::new(catalog);
        let scenes = engine
            .catalog()
            .search(&SceneQuery {
                interval: MonthInterval::of(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
                    .unwrap(),
                bbox: BBox::new(-74.60, 10.80, -74.55, 10.85),
                max_cloud_percent: 80.0,
            })
            .unwrap();
        assert_eq!(scenes.len(), 3);

        let grid = GridSpec::geographic(&BBox::new(-74.60, 10.80, -74.55, 10.85), 100.0).unwrap();
        let out = engine
            .composites(&scenes, &grid, &QualityRule::scl(), &[Band::Green, Band::Blue])
            .unwrap();

        assert_eq!(out.len(), 3);
        assert!(out[0].data().iter().all(|&v| v == 900.0));
        assert!(out[1].data().iter().all(|&v| v == 750.0));
        for &v in out[2].data() {
            assert_relative_eq!(v, 2800.0 / 3600.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn no_scenes_give_undefined_composites() {
        let engine = RasterEngine::new(InMemoryCatalog::new());
        let grid = GridSpec::geographic(&BBox::new(-74.60, 10.80, -74.55, 10.85), 200.0).unwrap();
        let out = engine
            .composites(&[], &grid, &QualityRule::scl(), &[Band::Red])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.data().iter().all(|v| v.is_nan())));
    }
}
