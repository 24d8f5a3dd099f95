//! Synthetic temperature heat points around a resolved location.

use crate::geo::GeoPoint;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

pub const HEAT_POINT_COUNT: usize = 50;
/// Maximum offset in degrees from the center, per axis.
pub const JITTER_DEGREES: f64 = 0.05;
const SYNTHETIC_SAMPLES: usize = 12;
const SYNTHETIC_SPREAD_C: f64 = 2.0;
const FALLBACK_TEMPERATURE_C: f64 = 28.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub weight: f64,
}

/// Scatter `HEAT_POINT_COUNT` points around `center`, each weighted by a
/// temperature drawn from the usable hourly samples. Without hourly data the
/// draw comes from synthetic samples around `current_temp`. Jittered
/// coordinates are clamped to the valid ranges near a pole or the antimeridian
/// rather than wrapped.
pub fn heat_points<R: Rng + ?Sized>(
    center: &GeoPoint,
    temperatures: &[Option<f64>],
    current_temp: Option<f64>,
    rng: &mut R,
) -> Vec<HeatPoint> {
    let mut pool: Vec<f64> = temperatures
        .iter()
        .flatten()
        .copied()
        .filter(|t| t.is_finite())
        .collect();

    if pool.is_empty() {
        let base = current_temp
            .filter(|t| t.is_finite())
            .unwrap_or(FALLBACK_TEMPERATURE_C);
        pool = (0..SYNTHETIC_SAMPLES)
            .map(|_| base + rng.gen_range(-SYNTHETIC_SPREAD_C..=SYNTHETIC_SPREAD_C))
            .collect();
    }

    (0..HEAT_POINT_COUNT)
        .filter_map(|_| {
            let weight = *pool.choose(&mut *rng)?;
            let latitude = center.latitude() + rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES);
            let longitude = center.longitude() + rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES);
            Some(HeatPoint {
                latitude: latitude.clamp(-90.0, 90.0),
                longitude: longitude.clamp(-180.0, 180.0),
                weight,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn madurai() -> GeoPoint {
        GeoPoint::new(9.9252, 78.1198).unwrap()
    }

    #[test]
    fn test_points_stay_near_center() {
        let mut rng = StdRng::seed_from_u64(7);
        let temps = vec![Some(30.0), None, Some(31.5)];
        let points = heat_points(&madurai(), &temps, None, &mut rng);

        assert_eq!(points.len(), HEAT_POINT_COUNT);
        for p in &points {
            assert!((p.latitude - 9.9252).abs() <= JITTER_DEGREES + 1e-9);
            assert!((p.longitude - 78.1198).abs() <= JITTER_DEGREES + 1e-9);
            assert!(p.weight == 30.0 || p.weight == 31.5);
        }
    }

    #[test]
    fn test_synthetic_weights_around_current_temp() {
        let mut rng = StdRng::seed_from_u64(42);
        let points = heat_points(&madurai(), &[], Some(20.0), &mut rng);

        assert_eq!(points.len(), HEAT_POINT_COUNT);
        assert!(points.iter().all(|p| (18.0..=22.0).contains(&p.weight)));
    }

    #[test]
    fn test_synthetic_weights_default_without_current_temp() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = heat_points(&madurai(), &[None], None, &mut rng);
        assert!(points.iter().all(|p| (26.0..=30.0).contains(&p.weight)));
    }

    #[test]
    fn test_points_clamped_near_pole_and_antimeridian() {
        let corner = GeoPoint::new(89.99, 179.99).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let points = heat_points(&corner, &[Some(-5.0)], None, &mut rng);

        assert_eq!(points.len(), HEAT_POINT_COUNT);
        for p in &points {
            assert!((-90.0..=90.0).contains(&p.latitude));
            assert!((-180.0..=180.0).contains(&p.longitude));
        }
    }

    #[test]
    fn test_all_missing_hourly_still_fills_heatmap() {
        let mut rng = StdRng::seed_from_u64(5);
        let points = heat_points(&madurai(), &[None; 24], Some(31.0), &mut rng);
        assert_eq!(points.len(), HEAT_POINT_COUNT);
        assert!(points.iter().all(|p| (29.0..=33.0).contains(&p.weight)));
    }

    #[test]
    fn test_same_seed_same_points() {
        let temps = vec![Some(25.0), Some(27.0)];
        let a = heat_points(&madurai(), &temps, None, &mut StdRng::seed_from_u64(9));
        let b = heat_points(&madurai(), &temps, None, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
