use std::f64::consts::PI;

use approx::assert_relative_eq;
use detnav::{
    blueprint::build_detector,
    bounds::{BoundsType, VolumeBounds},
    context::GeometryContext,
    delegates::DetectorVolumeUpdator,
    detector::{Detector, DetectorBuilder, VolumeId},
    navigation::{NavigationState, NavigationTarget},
    navigator::{initial_states, Navigator, TraceStatus},
    settings,
    structure::VolumeStructureConfig,
};
use indicatif::ProgressBar;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

fn three_cylinders() -> Detector {
    let settings = settings::load_default_config().unwrap();
    build_detector(&settings.detector, &GeometryContext::default()).unwrap()
}

#[test]
fn shared_boundaries_are_single_portals() {
    let detector = three_cylinders();
    let ids: Vec<VolumeId> = ["negative_endcap", "barrel", "positive_endcap"]
        .iter()
        .map(|name| detector.volume_id(name).unwrap())
        .collect();
    let [neg, mid, pos] = [ids[0], ids[1], ids[2]].map(|id| detector.volume(id));

    assert_eq!(neg.portals()[1], mid.portals()[0]);
    assert_eq!(mid.portals()[1], pos.portals()[0]);
    assert_eq!(detector.portals().len(), 10);

    let shared = [
        (neg.portals()[1], ids[0], ids[1]),
        (mid.portals()[1], ids[1], ids[2]),
    ];
    for (shared, lower, upper) in shared {
        let portal = detector.portal(shared);
        assert_eq!(portal.along(), &DetectorVolumeUpdator::Single(upper));
        assert_eq!(portal.opposite(), &DetectorVolumeUpdator::Single(lower));
    }

    let front = detector.portal(neg.portals()[0]);
    let back = detector.portal(pos.portals()[1]);
    assert_relative_eq!(front.surface().center().z, -400.0);
    assert_relative_eq!(back.surface().center().z, 400.0);
    assert!(!front.is_fully_linked());
    assert!(!back.is_fully_linked());
}

#[test]
fn straight_line_along_the_beam() {
    let detector = three_cylinders();
    let gctx = GeometryContext::default();
    let state = NavigationState::new(Point3::new(50.0, 0.0, -399.0), Vector3::z(), 1.0, -1.0);
    let trace = Navigator::new(100).trace(&gctx, &detector, state);

    assert_eq!(trace.status, TraceStatus::Exited);
    assert_eq!(trace.steps.len(), 3);
    let visited: Vec<&str> = trace.steps.iter().map(|s| detector.volume(s.volume).name()).collect();
    assert_eq!(visited, ["negative_endcap", "barrel", "positive_endcap"]);
    assert_eq!(trace.crossings().count(), 3);
    assert_relative_eq!(trace.path_length, 799.0, epsilon = 1e-9);
    assert_relative_eq!(trace.steps[2].position[2], 400.0, epsilon = 1e-9);
}

#[test]
fn radial_exit_through_barrel() {
    let detector = three_cylinders();
    let gctx = GeometryContext::default();
    let barrel = detector.volume_id("barrel").unwrap();

    // outward: the r = 70 layer, then the outer portal
    let state = NavigationState::new(Point3::new(50.0, 0.0, 100.0), Vector3::x(), 1.0, 1.0);
    let trace = Navigator::new(100).trace(&gctx, &detector, state);
    assert_eq!(trace.status, TraceStatus::Exited);
    assert_eq!(trace.steps.len(), 2);
    assert_eq!(trace.steps[0].target, NavigationTarget::Surface(1));
    assert_eq!(trace.steps[0].volume, barrel);
    assert_relative_eq!(trace.steps[0].path_length, 20.0, epsilon = 1e-9);
    assert_eq!(trace.crossings().count(), 1);
    assert_relative_eq!(trace.path_length, 50.0, epsilon = 1e-9);

    // inward: the r = 30 layer, then the inner hole at r = 10
    let state = NavigationState::new(Point3::new(50.0, 0.0, 100.0), -Vector3::x(), 1.0, 1.0);
    let trace = Navigator::new(100).trace(&gctx, &detector, state);
    assert_eq!(trace.status, TraceStatus::Exited);
    assert_eq!(trace.steps[0].target, NavigationTarget::Surface(0));
    assert_eq!(trace.steps[0].geometry_id.to_string(), "vol=2|sen=1");
    assert_relative_eq!(trace.path_length, 40.0, epsilon = 1e-9);
}

#[test]
fn layers_missed_along_the_beam_ends() {
    // beyond the layers' half length only portals are hit
    let detector = three_cylinders();
    let gctx = GeometryContext::default();
    let state = NavigationState::new(Point3::new(50.0, 0.0, 290.0), Vector3::x(), 1.0, 1.0);
    let trace = Navigator::new(100).trace(&gctx, &detector, state);
    assert_eq!(trace.steps.len(), 1);
    assert!(trace.steps[0].target.portal().is_some());
}

#[test]
fn parallel_traces_match_serial() {
    let detector = three_cylinders();
    let gctx = GeometryContext::default();
    let navigator = Navigator::new(100);
    let directions: Vec<Vector3<f64>> = (0..200)
        .map(|i| {
            let theta = PI * (i as f64 + 0.5) / 200.0;
            let phi = 0.7 * i as f64;
            Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
        })
        .collect();
    let states = initial_states(&Point3::new(50.0, 0.0, 0.0), &directions, 1.0, -1.0);

    let serial: Vec<_> = states
        .iter()
        .cloned()
        .map(|s| navigator.trace(&gctx, &detector, s))
        .collect();
    let parallel = navigator.trace_all(&gctx, &detector, states, &ProgressBar::hidden());

    assert_eq!(serial, parallel);
    assert!(parallel.iter().all(|t| t.status == TraceStatus::Exited));
}

#[test]
fn rotated_trapezoid_bounding_box() {
    let bounds = VolumeBounds::from_values(
        BoundsType::Trapezoid,
        &[5.0, 10.0, 8.0, 4.0, (16.0f64).atan2(5.0), (16.0f64).atan2(5.0)],
    )
    .unwrap();
    let local = bounds.bounding_box(None);
    assert_relative_eq!(local.max, Point3::new(10.0, 8.0, 4.0), epsilon = 1e-4);
    assert_relative_eq!(local.min, Point3::new(-10.0, -8.0, -4.0), epsilon = 1e-4);

    let shifted =
        Isometry3::from_parts(Translation3::new(1.0, 2.0, 3.0), UnitQuaternion::identity());
    let moved = bounds.bounding_box(Some(&shifted));
    assert_relative_eq!(moved.max, Point3::new(11.0, 10.0, 7.0), epsilon = 1e-4);
    assert_relative_eq!(moved.min, Point3::new(-9.0, -6.0, -1.0), epsilon = 1e-4);

    let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -0.5 * PI);
    let rotated = Isometry3::from_parts(Translation3::identity(), rotation);
    let turned = bounds.bounding_box(Some(&rotated));
    assert_relative_eq!(turned.max, Point3::new(4.0, 8.0, 10.0), epsilon = 1e-4);
    assert_relative_eq!(turned.min, Point3::new(-4.0, -8.0, -10.0), epsilon = 1e-4);
}

#[test]
fn extent_built_volume_navigates_like_explicit_one() {
    let gctx = GeometryContext::default();
    let mut explicit = VolumeStructureConfig::new(BoundsType::Cuboid);
    explicit.bound_values = vec![5.0, 5.0, 10.0];
    explicit.transform = Isometry3::translation(0.0, 0.0, 20.0);

    let mut from_extent = VolumeStructureConfig::new(BoundsType::Cuboid);
    let mut extent = detnav::extent::Extent::new();
    extent.set(detnav::bins::BinningValue::X, -5.0, 5.0);
    extent.set(detnav::bins::BinningValue::Y, -5.0, 5.0);
    extent.set(detnav::bins::BinningValue::Z, 10.0, 30.0);
    from_extent.extent = Some(extent);

    let mut lengths = Vec::new();
    for config in [explicit, from_extent] {
        let mut builder = DetectorBuilder::new("box");
        builder.add_volume_from_config(&gctx, "box", config).unwrap();
        let detector = builder.build().unwrap();
        let state = NavigationState::new(Point3::new(0.0, 0.0, 12.0), Vector3::z(), 1.0, 1.0);
        lengths.push(Navigator::new(10).trace(&gctx, &detector, state).path_length);
    }
    assert_relative_eq!(lengths[0], 18.0, epsilon = 1e-9);
    assert_relative_eq!(lengths[0], lengths[1], epsilon = 1e-9);
}
