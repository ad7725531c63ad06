//! Frame, load and picking lifecycle of a [`Context`] with headless
//! surfaces.

use std::cell::Cell;
use std::rc::Rc;

use vantage::rendering::{
    BufferSlot, FrameSource, HeadlessDevice, HeadlessObject, ImageState, ManualClock, PassRecord, PickQuery,
    RenderTarget, ScreenRect,
};
use vantage::ui::Listener;
use vantage::{Context, EventKind, NodeId, SurfaceId, VantageConfig, VantageError};

#[derive(Default)]
struct CountingFrames(u32);

impl FrameSource for CountingFrames {
    fn request_frame(&mut self) {
        self.0 += 1;
    }
}

fn attach(ctx: &mut Context, root: NodeId, device: HeadlessDevice) -> SurfaceId {
    ctx.attach_surface(root, Box::new(device), Box::new(ManualClock::new(0.0)))
        .unwrap()
}

fn headless(ctx: &mut Context, surface: SurfaceId) -> &mut HeadlessDevice {
    ctx.surface_mut(surface)
        .and_then(|s| s.device_as_mut::<HeadlessDevice>())
        .unwrap()
}

fn count_loads(ctx: &mut Context, root: NodeId) -> Rc<Cell<u32>> {
    let fired = Rc::new(Cell::new(0));
    let counter = Rc::clone(&fired);
    ctx.add_event_listener(root, EventKind::Load, Listener::callback(move |_| counter.set(counter.get() + 1)))
        .unwrap();
    fired
}

struct ImageScene {
    ctx: Context,
    surface: SurfaceId,
    root: NodeId,
    images: [NodeId; 2],
}

fn image_scene(config: VantageConfig) -> ImageScene {
    let mut ctx = Context::new(config).unwrap();
    let scene = ctx.scene_mut();
    let root = scene.create_node("xml3d");
    let view = scene.create_node("view");
    scene.append_child(root, view).unwrap();
    let mut images = [NodeId::new(0); 2];
    for (i, slot) in images.iter_mut().enumerate() {
        let img = scene.create_node("img");
        scene.set_attribute(img, "src", &format!("texture{i}.png")).unwrap();
        scene.append_child(root, img).unwrap();
        *slot = img;
    }
    let surface = attach(&mut ctx, root, HeadlessDevice::new(64, 64));
    ImageScene {
        ctx,
        surface,
        root,
        images,
    }
}

#[test]
fn test_ready_fires_once_after_all_loads_and_a_draw() {
    let ImageScene {
        mut ctx,
        surface,
        root,
        images: [first, second],
    } = image_scene(VantageConfig::default());
    let loads = count_loads(&mut ctx, root);
    let mut frames = CountingFrames::default();
    let tracker = ctx.load_tracker();

    assert_eq!(ctx.request_image(first), Some(ImageState::Loading));
    assert_eq!(ctx.request_image(second), Some(ImageState::Loading));
    tracker.begin(surface);

    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.drawn && !report.ready);
    assert_eq!(ctx.loads().pending(SurfaceId::GLOBAL), 2);
    assert_eq!(ctx.loads().pending(surface), 1);

    assert!(ctx.complete_image(first, true));
    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.drawn && !report.ready);
    assert_eq!(ctx.loads().pending(SurfaceId::GLOBAL), 1);

    assert!(ctx.complete_image(second, true));
    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.drawn && !report.ready);
    assert!(ctx.loads().is_load_complete(SurfaceId::GLOBAL));
    assert!(!ctx.is_complete(surface));

    tracker.finish(surface);
    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.drawn && report.ready);
    assert_eq!(loads.get(), 1);
    assert!(ctx.is_complete(surface));

    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(!report.drawn && !report.ready);

    // Forward latch: later loads never fire it again.
    tracker.begin(SurfaceId::GLOBAL);
    tracker.finish(SurfaceId::GLOBAL);
    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.drawn && !report.ready);
    assert_eq!(loads.get(), 1);
    assert_eq!(frames.0, 6);
}

#[test]
fn test_ready_is_tracked_per_surface() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let mut roots = [NodeId::new(0); 2];
    for root in &mut roots {
        let scene = ctx.scene_mut();
        *root = scene.create_node("xml3d");
        let view = scene.create_node("view");
        scene.append_child(*root, view).unwrap();
    }
    let [root_a, root_b] = roots;
    let a = attach(&mut ctx, root_a, HeadlessDevice::new(32, 32));
    let b = attach(&mut ctx, root_b, HeadlessDevice::new(32, 32));
    let loads_a = count_loads(&mut ctx, root_a);
    let loads_b = count_loads(&mut ctx, root_b);
    let mut frames = CountingFrames::default();
    let tracker = ctx.load_tracker();

    tracker.begin(a);
    tracker.begin(b);
    assert!(!ctx.tick(a, &mut frames).unwrap().ready);
    assert!(!ctx.tick(b, &mut frames).unwrap().ready);

    // `a` draining wakes both surfaces, but only `a` is ready.
    tracker.finish(a);
    let report = ctx.tick(a, &mut frames).unwrap();
    assert!(report.drawn && report.ready);
    let report = ctx.tick(b, &mut frames).unwrap();
    assert!(report.drawn && !report.ready);
    assert!(ctx.is_complete(a));
    assert!(!ctx.is_complete(b));
    assert_eq!((loads_a.get(), loads_b.get()), (1, 0));

    tracker.finish(b);
    assert!(!ctx.tick(a, &mut frames).unwrap().ready);
    assert!(ctx.tick(b, &mut frames).unwrap().ready);
    assert!(ctx.is_complete(b));
    assert_eq!((loads_a.get(), loads_b.get()), (1, 1));
}

#[test]
fn test_ready_rearms_when_configured() {
    let ImageScene {
        mut ctx,
        surface,
        root,
        images: [first, _],
    } = image_scene(VantageConfig {
        rearm_ready_signal: true,
        ..VantageConfig::default()
    });
    let loads = count_loads(&mut ctx, root);
    let mut frames = CountingFrames::default();

    assert!(ctx.tick(surface, &mut frames).unwrap().ready);
    assert_eq!(loads.get(), 1);

    ctx.request_image(first);
    assert!(!ctx.tick(surface, &mut frames).unwrap().ready);
    ctx.complete_image(first, false);
    assert!(ctx.tick(surface, &mut frames).unwrap().ready);
    assert_eq!(loads.get(), 2);
}

#[test]
fn test_removed_image_releases_its_load() {
    let ImageScene {
        mut ctx,
        surface,
        root,
        images: [first, _],
    } = image_scene(VantageConfig::default());
    let mut frames = CountingFrames::default();

    ctx.request_image(first);
    ctx.tick(surface, &mut frames).unwrap();
    assert_eq!(ctx.loads().pending(SurfaceId::GLOBAL), 1);

    ctx.scene_mut().remove_child(root, first).unwrap();
    let report = ctx.tick(surface, &mut frames).unwrap();
    assert!(report.ready);
    assert_eq!(ctx.loads().pending(SurfaceId::GLOBAL), 0);
    assert_eq!(ctx.request_image(first), None);
}

#[test]
fn test_empty_scene_picks_nothing() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let root = ctx.scene_mut().create_node("xml3d");
    let surface = attach(&mut ctx, root, HeadlessDevice::new(100, 100));

    let by_point = ctx.element_by_point(surface, 50.0, 50.0, PickQuery::ALL).unwrap();
    assert_eq!(by_point.object, None);
    assert!(by_point.position.is_some_and(|p| p.is_nan()));
    assert!(by_point.normal.is_some_and(|n| n.is_nan()));

    let ray = ctx.generate_ray(surface, 50.0, 50.0).unwrap();
    assert!(!ray.is_degenerate());
    let by_ray = ctx.element_by_ray(surface, &ray, PickQuery::ALL).unwrap();
    assert_eq!(by_ray.object, None);
    assert!(by_ray.position.is_some_and(|p| p.is_nan()));
    assert!(by_ray.normal.is_some_and(|n| n.is_nan()));

    let object_only = ctx.element_by_point(surface, 50.0, 50.0, PickQuery::OBJECT).unwrap();
    assert_eq!(object_only.position, None);
    assert_eq!(ctx.picked_normal(surface, 50.0, 50.0).unwrap(), None);
}

#[test]
fn test_postprocess_stages_run_in_order_and_honor_visibility() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let scene = ctx.scene_mut();
    let root = scene.create_node("xml3d");
    let chain = scene.create_node("postprocess");
    scene.append_child(root, chain).unwrap();
    for name in ["blur", "bloom", "tonemap"] {
        let stage = scene.create_node("compositor");
        scene.set_attribute(stage, "shader", name).unwrap();
        scene.append_child(chain, stage).unwrap();
    }
    let surface = attach(&mut ctx, root, HeadlessDevice::new(64, 64));
    let mut frames = CountingFrames::default();

    ctx.tick(surface, &mut frames).unwrap();
    let passes = headless(&mut ctx, surface).take_passes();
    assert_eq!(passes[0], PassRecord::Scene(RenderTarget::Buffer(BufferSlot::Original)));
    let shaders: Vec<_> = passes
        .iter()
        .filter_map(|p| match p {
            PassRecord::Shader(pass) => Some(pass.clone()),
            _ => None,
        })
        .collect();
    let names: Vec<&str> = shaders.iter().map(|p| p.shader.name()).collect();
    assert_eq!(names, ["blur", "bloom", "tonemap"]);
    assert_eq!(shaders[0].input, BufferSlot::Original);
    for pair in shaders.windows(2) {
        assert_eq!(RenderTarget::Buffer(pair[1].input.clone()), pair[0].output);
    }
    for pass in &shaders {
        assert_ne!(RenderTarget::Buffer(pass.input.clone()), pass.output);
    }
    assert_eq!(shaders[2].output, RenderTarget::Surface);

    ctx.scene_mut().set_attribute(chain, "visible", "false").unwrap();
    assert!(ctx.tick(surface, &mut frames).unwrap().drawn);
    assert_eq!(headless(&mut ctx, surface).take_passes(), [PassRecord::Scene(RenderTarget::Surface)]);
}

#[test]
fn test_default_view_created_and_active_view_followed() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let root = ctx.scene_mut().create_node("xml3d");
    let surface = attach(&mut ctx, root, HeadlessDevice::new(32, 32));

    let created = ctx.scene().first_child_with_tag(root, "view").unwrap();
    assert_eq!(headless(&mut ctx, surface).active_view(), Some(created));

    let scene = ctx.scene_mut();
    let second = scene.create_node("view");
    scene.set_attribute(second, "id", "cam2").unwrap();
    scene.append_child(root, second).unwrap();
    scene.set_attribute(root, "activeView", "#cam2").unwrap();

    let mut frames = CountingFrames::default();
    ctx.tick(surface, &mut frames).unwrap();
    assert_eq!(headless(&mut ctx, surface).active_view(), Some(second));
}

#[test]
fn test_scene_edit_refreshes_pick_buffer() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let scene = ctx.scene_mut();
    let root = scene.create_node("xml3d");
    let mesh = scene.create_node("mesh");
    scene.append_child(root, mesh).unwrap();
    let mut device = HeadlessDevice::new(100, 100);
    device.add_object(HeadlessObject::new(mesh).with_footprint(ScreenRect::new(0.0, 0.0, 50.0, 100.0)));
    let surface = attach(&mut ctx, root, device);

    let hit = ctx.element_by_point(surface, 10.0, 10.0, PickQuery::OBJECT).unwrap();
    assert_eq!(hit.object, Some(mesh));
    ctx.element_by_point(surface, 80.0, 10.0, PickQuery::OBJECT).unwrap();
    assert_eq!(headless(&mut ctx, surface).id_pass_count(), 1);

    let scene = ctx.scene_mut();
    let added = scene.create_node("mesh");
    scene.append_child(root, added).unwrap();
    ctx.element_by_point(surface, 10.0, 10.0, PickQuery::OBJECT).unwrap();
    assert_eq!(headless(&mut ctx, surface).id_pass_count(), 2);
}

#[test]
fn test_failed_draw_keeps_frame_pending() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let root = ctx.scene_mut().create_node("xml3d");
    let surface = attach(&mut ctx, root, HeadlessDevice::new(16, 16));
    let mut frames = CountingFrames::default();

    headless(&mut ctx, surface).fail_next_scene_pass("device lost");
    assert!(matches!(ctx.tick(surface, &mut frames), Err(VantageError::Render(_))));
    assert_eq!(frames.0, 1);
    assert!(ctx.tick(surface, &mut frames).unwrap().drawn);
    let stats = ctx.surface(surface).unwrap().scheduler().stats();
    assert_eq!((stats.frames_failed, stats.frames_drawn), (1, 1));
}

#[test]
fn test_rendered_texture_sizes_and_unknown_sources() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let scene = ctx.scene_mut();
    let root = scene.create_node("xml3d");
    let target = scene.create_node("rendertarget");
    scene.set_attribute(target, "id", "mirror").unwrap();
    scene.set_attribute(target, "width", "128").unwrap();
    let stage = scene.create_node("compositor");
    scene.set_attribute(stage, "shader", "flip").unwrap();
    scene.append_child(target, stage).unwrap();
    scene.append_child(root, target).unwrap();
    let surface = attach(&mut ctx, root, HeadlessDevice::new(64, 64));

    let handle = ctx.rendered_texture(surface, "#mirror").unwrap().unwrap();
    assert_eq!((handle.width, handle.height), (128, 512));
    assert_eq!(headless(&mut ctx, surface).texture_size("#mirror"), Some((128, 512)));
    assert_eq!(ctx.rendered_texture(surface, "#missing").unwrap(), None);
}

#[test]
fn test_resize_ignores_empty_sizes() {
    let mut ctx = Context::new(VantageConfig::default()).unwrap();
    let root = ctx.scene_mut().create_node("xml3d");
    let surface = attach(&mut ctx, root, HeadlessDevice::new(16, 16));

    assert!(!ctx.resize(surface, 0, 10).unwrap());
    assert!(ctx.resize(surface, 40, 30).unwrap());
    assert_eq!(ctx.surface(surface).unwrap().device().size(), (40, 30));
}

#[test]
fn test_attach_and_detach_errors() {
    assert!(matches!(
        Context::from_toml_str("max_fps = 0"),
        Err(VantageError::Config(_))
    ));

    let mut ctx = Context::from_toml_str("picking = true\nclick_slop_px = 2.0").unwrap();
    assert!((ctx.config().click_slop_px - 2.0).abs() < f32::EPSILON);
    let root = ctx.scene_mut().create_node("xml3d");
    let surface = attach(&mut ctx, root, HeadlessDevice::new(8, 8));

    let again = ctx.attach_surface(root, Box::new(HeadlessDevice::new(8, 8)), Box::new(ManualClock::new(0.0)));
    assert!(matches!(again, Err(VantageError::RootInUse { surface: s, .. }) if s == surface));
    assert!(matches!(
        ctx.attach_surface(NodeId::new(999), Box::new(HeadlessDevice::new(8, 8)), Box::new(ManualClock::new(0.0))),
        Err(VantageError::Scene(_))
    ));

    ctx.detach_surface(surface).unwrap();
    assert!(ctx.surface(surface).is_none());
    assert!(matches!(
        ctx.add_event_listener(root, EventKind::Click, Listener::callback(|_| {})),
        Err(VantageError::NoEventAdapter(_))
    ));
    assert!(matches!(ctx.detach_surface(surface), Err(VantageError::UnknownSurface(_))));
}
