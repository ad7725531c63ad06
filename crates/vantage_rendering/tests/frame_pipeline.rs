//! Scheduler, picker and post-process chain driven together against the
//! headless device.

use vantage_core::RedrawRequest;
use vantage_rendering::{
    BufferSlot, FallbackTimer, FrameScheduler, HeadlessDevice, HeadlessObject, ManualClock,
    PassRecord, PickQuery, Picker, PostProcessChain, RenderTarget, ScreenRect, ShaderRef,
};
use vantage_shared::{NodeId, SurfaceId};

const SURFACE: SurfaceId = SurfaceId(1);

fn redraw(picking: bool) -> RedrawRequest {
    RedrawRequest {
        surface: SURFACE,
        cause: "test".into(),
        picking,
    }
}

fn setup() -> (FrameScheduler, HeadlessDevice, Picker, ManualClock) {
    let clock = ManualClock::new(0.0);
    let scheduler = FrameScheduler::new(SURFACE, Box::new(clock.clone()), 512);
    let mut device = HeadlessDevice::new(64, 64);
    device.add_object(HeadlessObject::new(NodeId::new(5)).with_footprint(ScreenRect::new(0.0, 0.0, 32.0, 64.0)));
    (scheduler, device, Picker::default(), clock)
}

#[test]
fn test_id_pass_only_after_scene_redraw() {
    let (mut scheduler, mut device, mut picker, _clock) = setup();

    assert_eq!(picker.render_pick(&mut device, scheduler.flags_mut(), 10.0, 10.0), Some(NodeId::new(5)));
    assert_eq!(picker.render_pick(&mut device, scheduler.flags_mut(), 40.0, 10.0), None);
    assert_eq!(device.id_pass_count(), 1);

    scheduler.redraw(&redraw(false));
    picker.render_pick(&mut device, scheduler.flags_mut(), 10.0, 10.0);
    assert_eq!(device.id_pass_count(), 1);

    scheduler.redraw(&redraw(true));
    picker.render_pick(&mut device, scheduler.flags_mut(), 10.0, 10.0);
    assert_eq!(device.id_pass_count(), 2);
}

#[test]
fn test_each_stage_runs_once_per_frame_in_order() {
    let (mut scheduler, mut device, _picker, clock) = setup();
    scheduler.set_postprocess(Some(PostProcessChain::from_stages(vec![
        ShaderRef::new("blur"),
        ShaderRef::new("bloom"),
        ShaderRef::new("tonemap"),
    ])));
    let mut timer = FallbackTimer::new(clock.clone(), 30);

    scheduler.tick(&mut device, &mut timer).unwrap();
    let passes = device.take_passes();
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
    for pass in &shaders {
        assert_ne!(RenderTarget::Buffer(pass.input.clone()), pass.output);
    }
    assert_eq!(shaders.last().map(|p| p.output.clone()), Some(RenderTarget::Surface));

    // Idle frame: nothing drawn, timer re-armed.
    clock.advance(40.0);
    assert!(timer.take_due());
    assert!(!scheduler.tick(&mut device, &mut timer).unwrap().drawn);
    assert!(device.passes().is_empty());
    assert_eq!(timer.requested(), 2);
}

#[test]
fn test_ray_and_point_picks_agree() {
    let (mut scheduler, mut device, mut picker, _clock) = setup();
    let by_point = picker.element_by_point(&mut device, scheduler.flags_mut(), 32.0, 32.0, PickQuery::OBJECT);
    assert_eq!(by_point.object, None);

    let ray = Picker::generate_ray(&device, 32.0, 32.0);
    let by_ray = Picker::element_by_ray(&mut device, &ray, PickQuery::ALL);
    assert_eq!(by_ray.object, Some(NodeId::new(5)));
    assert!(by_ray.position.is_some_and(|p| p.is_finite()));
}
