use std::collections::HashMap;

use prism_ngin::device::{TextureFormat, UniformValue};
use prism_ngin::{FboSystem, RenderConfig, RenderContext};

use crate::common::test_utils::TraceDevice;

mod common;

fn add_gbuffer(fbos: &mut FboSystem, device: &mut TraceDevice, name: &str, format: TextureFormat) {
    fbos.add(device, name, true, true, 256, 256, format, TextureFormat::Depth24)
        .unwrap();
}

#[test]
fn fixed_point_color_completes_without_fallback() {
    let mut device = TraceDevice::new();
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);

    let fbo = fbos.get("gbuf").unwrap();
    assert!(fbo.is_complete());
    assert_eq!(fbo.color_format(), TextureFormat::Rgba8);
    assert!(device.destroyed_framebuffers.is_empty());
}

#[test]
fn float_color_falls_back_once_to_rgba8() {
    common::test_utils::init_logs();
    let mut device = TraceDevice::rejecting_float_color();
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "hdr", TextureFormat::Rgba16F);

    let fbo = fbos.get("hdr").unwrap();
    assert!(fbo.is_complete());
    assert_eq!(fbo.color_format(), TextureFormat::Rgba8);
    // Exactly one rebuild: the failed float attempt was torn down.
    assert_eq!(device.destroyed_framebuffers.len(), 1);
}

#[test]
fn non_format_incompleteness_is_terminal() {
    // Rejecting Rgba8 leaves no fallback to try.
    let mut device = TraceDevice::new();
    device.reject_color_formats = vec![TextureFormat::Rgba8];
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);

    assert!(!fbos.is_complete("gbuf"));
    assert!(device.destroyed_framebuffers.is_empty());
}

#[test]
fn re_adding_a_name_tears_down_the_previous_target() {
    common::test_utils::init_logs();
    let mut device = TraceDevice::new();
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);

    assert!(fbos.is_complete("gbuf"));
    // The first registration's framebuffer and both attachments are gone.
    assert_eq!(device.destroyed_framebuffers.len(), 1);
    assert_eq!(device.destroyed_textures.len(), 2);
}

#[test]
fn autoresize_only_touches_flagged_fbos_with_changed_dimensions() {
    let mut device = TraceDevice::new();
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "follows", TextureFormat::Rgba8);
    add_gbuffer(&mut fbos, &mut device, "fixed", TextureFormat::Rgba8);
    fbos.get_mut("follows").unwrap().auto_resize = true;

    fbos.autoresize(&mut device, 512, 512).unwrap();
    assert_eq!(fbos.get("follows").unwrap().size(), (512, 512));
    assert_eq!(fbos.get("fixed").unwrap().size(), (256, 256));
    assert_eq!(device.destroyed_framebuffers.len(), 1);

    // Same dimensions again: nothing is recreated.
    fbos.autoresize(&mut device, 512, 512).unwrap();
    assert_eq!(device.destroyed_framebuffers.len(), 1);
}

#[test]
fn configure_binds_write_target_and_clears() {
    let mut device = TraceDevice::new();
    let mut ctx = RenderContext::new(640, 480);
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);

    let mut config = RenderConfig::new("geometry");
    config.compile(&mut device, "void main() {}", "void main() {}");
    config.set_write_target(Some("gbuf"));
    // A writing pass never samples, even with read targets registered.
    config.add_read_target("gbuf");

    config.apply(&mut device, &mut ctx, &HashMap::new(), &mut fbos);
    assert_eq!(ctx.current_write_target(), Some("gbuf"));
    assert!(device.framebuffer_binds.last().unwrap().is_some());
    assert_eq!(device.viewport_log.last(), Some(&(256, 256)));
    assert_eq!(device.clear_log.last(), Some(&(true, true)));
    assert!(!device.uniform_was_written("gbufColor"));

    config.restore(&mut device, &mut ctx, &mut fbos);
    assert_eq!(ctx.current_write_target(), None);
    assert_eq!(device.framebuffer_binds.last(), Some(&None));
    // Viewport falls back to the context's screen dimensions.
    assert_eq!(device.viewport_log.last(), Some(&(640, 480)));
}

#[test]
fn depth_only_pass_masks_color_and_skips_color_clear() {
    let mut device = TraceDevice::new();
    let mut ctx = RenderContext::new(640, 480);
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "shadow", TextureFormat::Rgba8);

    let mut config = RenderConfig::new("shadow");
    config.compile(&mut device, "void main() {}", "void main() {}");
    config.set_write_target(Some("shadow"));
    config.depth_only = true;

    config.apply(&mut device, &mut ctx, &HashMap::new(), &mut fbos);
    assert_eq!(device.color_mask_log.last(), Some(&false));
    assert_eq!(device.clear_log.last(), Some(&(false, true)));

    config.restore(&mut device, &mut ctx, &mut fbos);
    assert_eq!(device.color_mask_log.last(), Some(&true));
}

#[test]
fn read_targets_occupy_unit_pairs_with_companion_uniforms() {
    let mut device = TraceDevice::new();
    let mut ctx = RenderContext::new(640, 480);
    let mut fbos = FboSystem::new();
    add_gbuffer(&mut fbos, &mut device, "gbuf", TextureFormat::Rgba8);
    add_gbuffer(&mut fbos, &mut device, "light", TextureFormat::Rgba8);

    let frag = "uniform sampler2D gbufColor;\n\
                uniform sampler2D gbufDepth;\n\
                uniform vec2 gbufResolution;\n\
                uniform int gbufEnabled;\n\
                uniform sampler2D lightColor;\n\
                uniform sampler2D lightDepth;\n\
                uniform vec2 lightResolution;\n\
                uniform int lightEnabled;\n\
                uniform sampler2D noiseMap;\n\
                void main() {}";
    let mut config = RenderConfig::new("compose");
    config.compile(&mut device, "void main() {}", frag);
    // One registered sampler at unit 2 pushes read targets to start at 3.
    config.bind_texture_uniform("noiseMap", "noise.png", 2);
    config.add_read_target("gbuf");
    config.add_read_target("light");

    config.apply(&mut device, &mut ctx, &HashMap::new(), &mut fbos);
    assert_eq!(device.last_uniform("gbufColor"), Some(UniformValue::Int(3)));
    assert_eq!(device.last_uniform("gbufDepth"), Some(UniformValue::Int(4)));
    assert_eq!(
        device.last_uniform("gbufResolution"),
        Some(UniformValue::Vec2([256.0, 256.0]))
    );
    assert_eq!(device.last_uniform("gbufEnabled"), Some(UniformValue::Int(1)));
    assert_eq!(device.last_uniform("lightColor"), Some(UniformValue::Int(5)));
    assert_eq!(device.last_uniform("lightDepth"), Some(UniformValue::Int(6)));

    config.restore(&mut device, &mut ctx, &mut fbos);
    // Read units are released.
    assert_eq!(device.bound_texture(3), None);
    assert_eq!(device.bound_texture(4), None);
    assert_eq!(device.bound_texture(5), None);
}
