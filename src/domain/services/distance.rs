//! Geodistance Service
//!
//! Pure geometry and ranking used by the GeoSort stage: great-circle
//! angles between located addresses and the closest-first ordering of
//! answer records.

use crate::domain::entities::{DistanceInfo, IpInfo, UNKNOWN_DISTANCE};

/// Great-circle angle between two `(latitude, longitude)` points, in
/// degrees of arc on the unit sphere (haversine form).
pub fn arc_degrees(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let angle = 2.0 * h.sqrt().min(1.0).asin();

    angle.to_degrees().abs()
}

/// Compare two address infos: the arc distance when both carry a usable
/// city location ([`UNKNOWN_DISTANCE`] otherwise), and whether they
/// resolve to the same country.
///
/// Country resolution prefers the city record's country and falls back to
/// the country database; an address with no country on either level keeps
/// GeoName ID 0, so two such addresses count as matched.
pub fn distance_between(from: &IpInfo, to: &IpInfo) -> DistanceInfo {
    let mut result = DistanceInfo::unknown();

    let from_city = from.city.unwrap_or_default();
    let to_city = to.city.unwrap_or_default();

    if from_city.has_location() && to_city.has_location() {
        result.distance = arc_degrees(
            (from_city.latitude, from_city.longitude),
            (to_city.latitude, to_city.longitude),
        );
    }

    let mut from_country = from_city.country_id;
    if from_country == 0 {
        from_country = from.country_id.unwrap_or(0);
    }
    let mut to_country = to_city.country_id;
    if to_country == 0 {
        to_country = to.country_id.unwrap_or(0);
    }
    result.country_matched = from_country == to_country;

    result
}

/// Order items closest-first and keep at most `max` of them.
///
/// The sort is stable with the distance as the primary key. When both
/// sides carry the unknown-distance sentinel, items in the client's
/// country are preferred; among other equal distances the incoming order
/// is kept.
pub fn select_closest<T>(items: Vec<(T, DistanceInfo)>, max: usize) -> Vec<T> {
    let max = max.min(items.len());

    let mut items = items;
    items.sort_by(|(_, a), (_, b)| {
        if a.is_unknown() && b.is_unknown() {
            b.country_matched.cmp(&a.country_matched)
        } else {
            a.distance.total_cmp(&b.distance)
        }
    });

    items.truncate(max);
    items.into_iter().map(|(item, _)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::CityLocation;

    fn located(country_id: u32, latitude: f64, longitude: f64) -> IpInfo {
        IpInfo {
            city: Some(CityLocation {
                country_id,
                latitude,
                longitude,
            }),
            country_id: None,
        }
    }

    fn info(d: f64, matched: bool) -> DistanceInfo {
        DistanceInfo {
            distance: d,
            country_matched: matched,
        }
    }

    #[test]
    fn test_arc_degrees_zero_for_same_point() {
        assert!(arc_degrees((48.85, 2.35), (48.85, 2.35)) < 1e-9);
    }

    #[test]
    fn test_arc_degrees_antipodal_is_180() {
        let d = arc_degrees((0.0, 0.0), (0.0, 180.0));
        assert!((d - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_arc_degrees_paris_to_berlin() {
        // Paris -> Berlin is roughly 878 km, about 7.9 degrees of arc.
        let d = arc_degrees((48.8566, 2.3522), (52.52, 13.405));
        assert!(d > 7.0 && d < 9.0, "unexpected arc: {d}");
    }

    #[test]
    fn test_distance_between_located_pair() {
        let a = located(1, 48.8566, 2.3522);
        let b = located(1, 52.52, 13.405);
        let info = distance_between(&a, &b);
        assert!(!info.is_unknown());
        assert!(info.country_matched);
    }

    #[test]
    fn test_distance_unknown_when_one_side_unlocated() {
        let a = located(1, 48.85, 2.35);
        let b = IpInfo {
            city: None,
            country_id: Some(2),
        };
        let info = distance_between(&a, &b);
        assert!(info.is_unknown());
        assert!(!info.country_matched);
    }

    #[test]
    fn test_country_falls_back_to_country_database() {
        let a = IpInfo {
            city: Some(CityLocation {
                country_id: 0,
                latitude: 10.0,
                longitude: 10.0,
            }),
            country_id: Some(5),
        };
        let b = IpInfo {
            city: None,
            country_id: Some(5),
        };
        assert!(distance_between(&a, &b).country_matched);
    }

    #[test]
    fn test_both_countries_absent_count_as_matched() {
        let a = located(0, 1.0, 1.0);
        let b = located(0, 2.0, 2.0);
        assert!(distance_between(&a, &b).country_matched);
    }

    #[test]
    fn test_select_closest_orders_by_distance() {
        let items = vec![("far", info(50.0, false)), ("near", info(1.0, false))];
        assert_eq!(select_closest(items, 2), vec!["near", "far"]);
    }

    #[test]
    fn test_select_closest_truncates() {
        let items = vec![
            ("a", info(1.0, false)),
            ("b", info(2.0, false)),
            ("c", info(3.0, false)),
        ];
        assert_eq!(select_closest(items, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_select_closest_max_above_len() {
        let items = vec![("only", info(1.0, false))];
        assert_eq!(select_closest(items, 10), vec!["only"]);
    }

    #[test]
    fn test_sentinel_tiebreak_prefers_country_match() {
        let items = vec![
            ("abroad", DistanceInfo::unknown()),
            (
                "home",
                DistanceInfo {
                    distance: UNKNOWN_DISTANCE,
                    country_matched: true,
                },
            ),
        ];
        assert_eq!(select_closest(items, 2), vec!["home", "abroad"]);
    }

    #[test]
    fn test_sentinel_sorts_after_known() {
        let items = vec![
            (
                "unknown",
                DistanceInfo {
                    distance: UNKNOWN_DISTANCE,
                    country_matched: true,
                },
            ),
            ("known", info(179.0, false)),
        ];
        assert_eq!(select_closest(items, 2), vec!["known", "unknown"]);
    }

    #[test]
    fn test_equal_known_distances_keep_incoming_order() {
        let items = vec![
            ("first", info(3.0, false)),
            ("second", info(3.0, true)),
            ("third", info(3.0, false)),
        ];
        assert_eq!(select_closest(items, 3), vec!["first", "second", "third"]);
    }
}
