//! Shadow Report
//!
//! Drives the shadow subsystem through every mode combination on the
//! headless device and logs what it did: atlas layout, per-light tiles,
//! frame statistics and leftover resources.
//!
//! Usage: RUST_LOG=info cargo run -p shadow-report [shadow-config.json]

use umbra_render::prelude::*;
use umbra_render::shadow::ShadowResult;

fn scene_casters() -> Vec<MeshCaster> {
    let ground = MeshCaster::new(MeshId(0), 6)
        .with_bounds(Vec3::new(-20.0, -0.1, -20.0), Vec3::new(20.0, 0.0, 20.0));

    let mut casters = vec![ground];
    for i in 0..4 {
        let offset = Vec3::new(i as f32 * 4.0 - 6.0, 1.0, (i % 2) as f32 * 3.0);
        casters.push(
            MeshCaster::new(MeshId(1 + i as u64), 36)
                .with_bounds(Vec3::splat(-1.0), Vec3::splat(1.0))
                .with_transform(Mat4::from_translation(offset)),
        );
    }
    // Far outside every light, culled when culling is on
    casters.push(
        MeshCaster::new(MeshId(99), 36)
            .with_bounds(Vec3::splat(-1.0), Vec3::splat(1.0))
            .with_transform(Mat4::from_translation(Vec3::new(500.0, 0.0, 500.0))),
    );
    casters
}

fn scene_lights(config: &ShadowConfig) -> LightSet {
    let res = config.default_resolution;
    let mut lights = LightSet::new();

    let mut sun = DirectionalLight::new("sun", Vec3::new(-0.4, -1.0, -0.3), res);
    sun.fit_to_bounds(Vec3::new(-20.0, -1.0, -20.0), Vec3::new(20.0, 4.0, 20.0));
    lights.add_directional(sun);

    lights.add_spot(SpotLight::new("spot a", Vec3::new(-5.0, 8.0, 0.0), Vec3::new(0.2, -1.0, 0.0), 0.5, 25.0, res));
    lights.add_spot(SpotLight::new("spot b", Vec3::new(5.0, 8.0, 2.0), Vec3::new(-0.2, -1.0, 0.1), 0.4, 25.0, res));

    for i in 0..2 {
        let position = Vec3::new(i as f32 * 8.0 - 4.0, 3.0, -4.0);
        lights.add_point(PointLight::new(format!("lamp {i}"), position, 15.0, res / 4));
    }
    lights
}

fn log_lights(shadows: &ShadowManager, lights: &LightSet) {
    for (id, light) in lights.directional_lights() {
        log_planar(shadows, id, "directional", &light.shadow, light.light_space);
    }
    for (id, light) in lights.spot_lights() {
        log_planar(shadows, id, "spot", &light.shadow, light.light_space);
    }
    for (id, light) in lights.point_lights() {
        log::info!(
            "  #{id} point '{}': cube {} standard={} rsm={}",
            light.shadow.label(),
            light.shadow.resolution(),
            light.shadow.has_standard(),
            light.shadow.has_rsm()
        );
    }
}

fn log_planar(shadows: &ShadowManager, id: u64, kind: &str, shadow: &LightShadowMap, light_space: Mat4) {
    let info = shadows.shadow_info(shadow, light_space);
    match shadow.atlas_rect() {
        Some(rect) => log::info!(
            "  #{id} {kind} '{}': atlas tile ({:.3}, {:.3}) {:.3}x{:.3} rsm={}",
            shadow.label(),
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            shadow.use_rsm()
        ),
        None => log::info!(
            "  #{id} {kind} '{}': own target {} standard={} rsm={} texel={:.6}",
            shadow.label(),
            shadow.resolution(),
            shadow.has_standard(),
            shadow.has_rsm(),
            info.texel_size
        ),
    }
}

fn run(config: ShadowConfig) -> ShadowResult<()> {
    let mut device = HeadlessDevice::new();
    let programs = ShadowPrograms::compile(&mut device)?;
    let mut shadows = ShadowManager::new(&config, programs);
    let mut lights = scene_lights(&config);

    let meshes = scene_casters();
    let casters: Vec<&dyn ShadowCaster> = meshes.iter().map(|m| m as &dyn ShadowCaster).collect();

    let passes = [
        (ShadowMode::Standard, AtlasMode::Individual),
        (ShadowMode::Rsm, AtlasMode::Individual),
        (ShadowMode::Standard, AtlasMode::Atlas),
        (ShadowMode::Rsm, AtlasMode::Atlas),
    ];

    for (frame, (shadow_mode, atlas_mode)) in passes.into_iter().enumerate() {
        shadows.set_shadow_mode(shadow_mode);
        shadows.set_atlas_mode(atlas_mode);
        device.clear_commands();

        let report = shadows.render_frame(&mut device, &mut lights, &casters);
        log::info!(
            "Frame {frame} {:?}/{:?}: {} rendered, {} failed, {} draws, {} culled, {} cube faces, {} commands",
            report.config.shadow_mode,
            report.config.atlas_mode,
            report.stats.lights_rendered,
            report.stats.lights_failed,
            report.stats.casters_drawn,
            report.stats.casters_culled,
            report.stats.faces_rendered,
            device.commands().len()
        );
        for (id, err) in &report.failures {
            log::warn!("  light #{id}: {err}");
        }
        if let Some(layout) = shadows.atlas_layout() {
            let (width, height) = layout.atlas_size();
            log::info!(
                "  atlas {}x{} tiles -> {}x{} px, {:.0}% used",
                layout.tiles_x,
                layout.tiles_y,
                width,
                height,
                layout.utilization() * 100.0
            );
        }
        log_lights(&shadows, &lights);
    }

    // Settings menu drops to the low preset; the atlas is resized next frame
    shadows.apply_config(&ShadowQuality::Low.to_config());
    let report = shadows.render_frame(&mut device, &mut lights, &casters);
    log::info!(
        "Low preset {:?}/{:?}: {} rendered, {} atlas tiles at {} px",
        report.config.shadow_mode,
        report.config.atlas_mode,
        report.stats.lights_rendered,
        report.stats.atlas_tiles_used,
        shadows.atlas_tile_resolution()
    );
    log_lights(&shadows, &lights);

    let rsm = shadows.rsm_uniforms();
    log::info!(
        "RSM params: smoothness={} bias={} radius={} intensity={}",
        rsm.smoothness,
        rsm.bias,
        rsm.radius,
        rsm.intensity
    );

    let mut cascades = CascadeShadowMap::new();
    cascades.init(&mut device, config.default_resolution, config.cascade_count)?;
    let splits = CascadeShadowMap::calculate_splits(0.1, config.shadow_distance, config.cascade_count, config.cascade_lambda);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 15.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh_gl(1.0, 16.0 / 9.0, 0.1, config.shadow_distance);
    cascades.update_matrices(view, proj, splits, Vec3::new(-0.4, -1.0, -0.3));
    cascades.render(&mut device, shadows.programs().standard, &casters);
    log::info!("Cascades: {} at {} splits {:?}", cascades.cascade_count(), cascades.resolution(), cascades.splits());

    cascades.release(&mut device);
    lights.release_all(&mut device);
    shadows.release(&mut device);
    shadows.programs().release(&mut device);

    log::info!(
        "Leftover resources: {} textures, {} samplers, {} targets, {} programs",
        device.live_textures(),
        device.live_samplers(),
        device.live_render_targets(),
        device.live_programs()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match ShadowConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{err}");
                std::process::exit(1);
            }
        },
        None => ShadowConfig::default(),
    };

    match serde_json::to_string(&config) {
        Ok(json) => log::debug!("Shadow config: {json}"),
        Err(err) => log::warn!("Could not serialize config: {err}"),
    }

    if let Err(err) = run(config) {
        log::error!("Shadow report failed: {err}");
        std::process::exit(1);
    }
}
