// ── Load ranking ──

use crate::error::CoreError;
use crate::model::RankedServer;

/// Sort by ascending load, keep `load_floor <= load < max_load`, truncate to
/// `top_n`. Loads under the floor are stale readings from servers that are
/// usually not accepting connections.
pub fn rank_by_load(
    mut servers: Vec<RankedServer>,
    max_load: u8,
    load_floor: u8,
    top_n: usize,
) -> Result<Vec<RankedServer>, CoreError> {
    servers.sort_by_key(|s| s.load_percent);
    servers.retain(|s| s.load_percent >= load_floor && s.load_percent < max_load);
    servers.truncate(top_n);

    if servers.is_empty() {
        return Err(CoreError::NoServersMatch {
            criteria: format!("load between {load_floor}% and {max_load}%"),
        });
    }
    Ok(servers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ceiling_and_floor_are_applied() {
        let servers = vec![
            RankedServer::new("au1", 20),
            RankedServer::new("au2", 90),
            RankedServer::new("au3", 3),
        ];
        let ranked = rank_by_load(servers, 70, 4, 10).unwrap();
        assert_eq!(ranked, vec![RankedServer::new("au1", 20)]);
    }

    #[test]
    fn boundaries() {
        let servers = vec![
            RankedServer::new("a", 4),
            RankedServer::new("b", 69),
            RankedServer::new("c", 70),
        ];
        let ranked = rank_by_load(servers, 70, 4, 10).unwrap();
        let ids: Vec<_> = ranked.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn output_is_sorted_bounded_and_truncated() {
        let servers: Vec<_> = (0..40u8)
            .rev()
            .map(|load| RankedServer::new(format!("s{load}"), load * 3))
            .collect();

        let ranked = rank_by_load(servers, 70, 4, 5).unwrap();

        assert_eq!(ranked.len(), 5);
        assert!(ranked.windows(2).all(|w| w[0].load_percent <= w[1].load_percent));
        assert!(ranked.iter().all(|s| (4..70).contains(&s.load_percent)));
        assert_eq!(ranked[0].load_percent, 6);
    }

    #[test]
    fn equal_loads_keep_input_order() {
        let servers = vec![
            RankedServer::new("x", 30),
            RankedServer::new("y", 10),
            RankedServer::new("z", 30),
        ];
        let ranked = rank_by_load(servers, 70, 4, 10).unwrap();
        let ids: Vec<_> = ranked.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn empty_result_is_no_match() {
        let err = rank_by_load(vec![RankedServer::new("a", 95)], 70, 4, 10).unwrap_err();
        assert!(matches!(err, CoreError::NoServersMatch { .. }));

        let err = rank_by_load(Vec::new(), 70, 4, 10).unwrap_err();
        assert!(matches!(err, CoreError::NoServersMatch { .. }));
    }
}
