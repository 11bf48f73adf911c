//! Integration tests for the animated node graph and interpolation
//!
//! These tests verify that:
//! - Interpolation chains compose left to right
//! - Extrapolation policies hold at and beyond the range ends
//! - String outputs interpolate numbers and colors componentwise
//! - Derived nodes follow the springs that drive them

use std::cell::RefCell;
use std::rc::Rc;

use kinetic_animation::{
    AnimationScheduler, Controller, Easing, Extrapolate, Interpolator, InterpolatorConfig,
    ManualHost, TargetId, UpdateProps, Value,
};

fn setup() -> (Rc<ManualHost>, AnimationScheduler) {
    let host = Rc::new(ManualHost::new());
    let scheduler = AnimationScheduler::new(host.clone());
    (host, scheduler)
}

#[test]
fn test_extrapolate_clamp() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(100.0).unwrap();
    let mapped = driver
        .interpolate_with(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![10.0, 20.0])
                .extrapolate(Extrapolate::Clamp),
        )
        .unwrap();

    assert_eq!(mapped.get(), Some(Value::Number(20.0)));
    handle.set_leaf(&driver, -5.0).unwrap();
    assert_eq!(mapped.get(), Some(Value::Number(10.0)));
}

#[test]
fn test_extrapolate_extend() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(2.0).unwrap();
    let mapped = driver.interpolate(vec![0.0, 1.0], vec![10.0, 20.0]).unwrap();
    assert_eq!(mapped.get(), Some(Value::Number(30.0)));
}

#[test]
fn test_extrapolate_identity() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(7.0).unwrap();
    let mapped = driver
        .interpolate_with(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![10.0, 20.0])
                .extrapolate(Extrapolate::Identity),
        )
        .unwrap();
    assert_eq!(mapped.get(), Some(Value::Number(7.0)));
}

#[test]
fn test_rgba_midpoint() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(0.5).unwrap();
    let color = driver
        .interpolate(
            vec![0.0, 1.0],
            vec!["rgba(0,0,0,1)", "rgba(255,255,255,1)"],
        )
        .unwrap();
    assert_eq!(color.get(), Some(Value::from("rgba(128,128,128,1)")));
}

#[test]
fn test_chain_composes_left_to_right() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(0.5).unwrap();

    // 0.5 -> 50 -> 0.5 -> 1.5 -> 3
    let percent = driver.interpolate(vec![0.0, 1.0], vec![0.0, 100.0]).unwrap();
    let back = percent.interpolate(vec![0.0, 100.0], vec![0.0, 1.0]).unwrap();
    let scaled = back
        .to(Interpolator::from_config(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![1.0, 2.0]).easing(Easing::Linear),
        )
        .unwrap())
        .unwrap();
    let doubled = scaled
        .map(|value| Value::Number(value.as_number().unwrap_or(0.0) * 2.0))
        .unwrap();

    assert_eq!(percent.get(), Some(Value::Number(50.0)));
    assert_eq!(doubled.get(), Some(Value::Number(3.0)));
}

#[test]
fn test_spring_drives_derived_nodes() {
    let (host, scheduler) = setup();
    let controller = Controller::new(&scheduler.handle(), [("progress", 0.0)]).unwrap();
    let progress = controller.key_node("progress").unwrap();
    let width = progress
        .interpolate(vec![0.0, 1.0], vec!["0px", "240px"])
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    width
        .on_change(move |value| seen_clone.borrow_mut().push(value.to_string()))
        .unwrap();
    assert!(width.is_attached());

    let _done = controller
        .animate(UpdateProps::new().to("progress", 1.0))
        .unwrap();
    host.run_until_idle(16.0, 2000);

    let seen = seen.borrow();
    assert!(seen.len() > 2);
    assert_eq!(seen.last().map(String::as_str), Some("240px"));
    assert_eq!(width.get(), Some(Value::from("240px")));
}

#[test]
fn test_template_binding() {
    let (host, scheduler) = setup();
    let handle = scheduler.handle();
    let controller = Controller::new(&handle, [("x", 0.0), ("y", 0.0)]).unwrap();
    let x = controller.key_node("x").unwrap();
    let y = controller.key_node("y").unwrap();
    let transform = handle
        .template("translate({}px, {}px)", &[x, y])
        .unwrap();
    let style = handle
        .object([("transform", transform), ("opacity", handle.constant(1.0).unwrap())])
        .unwrap();

    handle.bind_target(TargetId(7), &style).unwrap();
    let initial = host.take_applied();
    assert_eq!(initial.len(), 1);
    assert_eq!(
        initial[0].1.get("transform"),
        Some(&Value::from("translate(0px, 0px)"))
    );

    let _done = controller
        .animate(UpdateProps::new().to("x", 10.0).to("y", 5.0))
        .unwrap();
    host.run_until_idle(16.0, 2000);

    let applied = host.take_applied();
    assert!(!applied.is_empty());
    let (target, last) = applied.last().unwrap();
    assert_eq!(*target, TargetId(7));
    assert_eq!(last.get("transform"), Some(&Value::from("translate(10px, 5px)")));
    // Constants are not part of per-frame patches
    assert!(last.get("opacity").is_none());
}

#[test]
fn test_unobserved_nodes_are_released() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let driver = handle.leaf(1.0).unwrap();
    let derived = driver.interpolate(vec![0.0, 1.0], vec![0.0, 10.0]).unwrap();

    let listener = derived.on_change(|_| {}).unwrap();
    assert!(driver.is_attached());
    assert!(derived.remove_listener(listener));
    assert!(!driver.is_attached());

    assert!(derived.release());
    assert_eq!(driver.get(), None);
}

#[test]
fn test_combine_follows_every_parent() {
    let (_host, scheduler) = setup();
    let handle = scheduler.handle();
    let width = handle.leaf(10.0).unwrap();
    let height = handle.leaf(4.0).unwrap();
    let area = handle
        .combine(&[width.clone(), height.clone()], |inputs| {
            let product = inputs
                .iter()
                .map(|value| value.as_number().unwrap_or(0.0))
                .product::<f64>();
            Value::Number(product)
        })
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    area.on_change(move |value| seen_clone.borrow_mut().push(value.clone()))
        .unwrap();
    assert_eq!(area.get(), Some(Value::Number(40.0)));

    handle.set_leaf(&width, 5.0).unwrap();
    assert_eq!(area.get(), Some(Value::Number(20.0)));
    handle.set_leaf(&height, 2.0).unwrap();
    assert_eq!(area.get(), Some(Value::Number(10.0)));

    assert_eq!(
        *seen.borrow(),
        vec![Value::Number(20.0), Value::Number(10.0)]
    );
}

#[test]
fn test_unbind_target_stops_applying_values() {
    let (host, scheduler) = setup();
    let handle = scheduler.handle();
    let controller = Controller::new(&handle, [("x", 0.0)]).unwrap();
    let style = handle
        .object([("x", controller.key_node("x").unwrap())])
        .unwrap();

    let binding = handle.bind_target(TargetId(3), &style).unwrap();
    assert_eq!(host.take_applied().len(), 1);

    assert!(handle.unbind_target(binding));
    assert!(!handle.unbind_target(binding));

    let _done = controller.animate(UpdateProps::new().to("x", 10.0)).unwrap();
    host.run_until_idle(16.0, 2000);
    assert!(host.take_applied().is_empty());
    assert_eq!(controller.get("x"), Some(Value::Number(10.0)));
}
