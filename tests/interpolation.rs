use click_replay::player::lerp;

const TOLERANCE: f64 = 1e-9;

#[test]
fn endpoints_are_exact() {
    assert_eq!(lerp((0.0, 0.0), (100.0, 100.0), 0.0), (0.0, 0.0));
    assert_eq!(lerp((0.0, 0.0), (100.0, 100.0), 1.0), (100.0, 100.0));
}

#[test]
fn diagonal_path_is_proportional() {
    for step in 0..=10 {
        let progress = step as f64 / 10.0;
        let (x, y) = lerp((0.0, 0.0), (100.0, 100.0), progress);
        assert!((x - 100.0 * progress).abs() < TOLERANCE);
        assert!((y - 100.0 * progress).abs() < TOLERANCE);
    }
}

#[test]
fn works_with_negative_direction() {
    let (x, y) = lerp((100.0, 50.0), (0.0, -50.0), 0.5);
    assert!((x - 50.0).abs() < TOLERANCE);
    assert!((y - 0.0).abs() < TOLERANCE);
}
