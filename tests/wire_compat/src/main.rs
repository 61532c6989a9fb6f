fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use marquee_protocol::{CacheRegionTag, EventType, InboundEvent, RegionKind, heartbeat_frame};
    use marquee_realtime::route;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Parses a fixture the way the connection manager parses a text frame.
    fn parse_fixture(name: &str) -> InboundEvent {
        InboundEvent::parse(&read_fixture(name), Utc::now())
            .unwrap_or_else(|e| panic!("fixture {name} rejected: {e}"))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  client: {reserialized}"
        );
    }

    fn rendered(tags: &BTreeSet<CacheRegionTag>) -> Vec<String> {
        tags.iter().map(ToString::to_string).collect()
    }

    // --- Server push frames ---

    #[test]
    fn server_events_roundtrip() {
        for name in [
            "queue_update.json",
            "activity_update.json",
            "health_update.json",
            "movie_update.json",
            "download_complete.json",
            "import_complete.json",
            "unknown_event.json",
        ] {
            roundtrip_test::<InboundEvent>(name);
        }
    }

    #[test]
    fn fixture_timestamps_are_kept() {
        let event = parse_fixture("movie_update.json");
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 3).unwrap()
        );
    }

    #[test]
    fn fixture_queue_update() {
        let event = parse_fixture("queue_update.json");
        assert_eq!(event.kind(), EventType::QueueUpdate);
        assert_eq!(rendered(&route(&event)), ["Queue"]);
    }

    #[test]
    fn fixture_activity_update() {
        let event = parse_fixture("activity_update.json");
        assert_eq!(rendered(&route(&event)), ["Activity"]);
    }

    #[test]
    fn fixture_health_update_with_array_payload() {
        let event = parse_fixture("health_update.json");
        assert!(event.data.is_array());
        assert_eq!(rendered(&route(&event)), ["Health"]);
    }

    #[test]
    fn fixture_movie_update() {
        let event = parse_fixture("movie_update.json");
        assert_eq!(rendered(&route(&event)), ["Movie:42", "Movie:LIST"]);
    }

    #[test]
    fn fixture_movie_update_with_movie_id() {
        let event = parse_fixture("movie_update_movie_id.json");
        assert_eq!(
            route(&event),
            BTreeSet::from([
                CacheRegionTag::entity(RegionKind::Movie, "42"),
                CacheRegionTag::list(RegionKind::Movie),
            ])
        );
    }

    #[test]
    fn fixture_download_complete() {
        let event = parse_fixture("download_complete.json");
        let tags = route(&event);
        assert_eq!(tags.len(), 5);
        for kind in [
            RegionKind::Queue,
            RegionKind::Movie,
            RegionKind::Activity,
            RegionKind::History,
            RegionKind::WantedMovie,
        ] {
            assert!(tags.contains(&CacheRegionTag::kind(kind)), "missing {kind:?}");
        }
    }

    #[test]
    fn fixture_import_complete() {
        let event = parse_fixture("import_complete.json");
        let tags = route(&event);
        assert_eq!(tags.len(), 3);
        assert!(!tags.contains(&CacheRegionTag::kind(RegionKind::Queue)));
    }

    #[test]
    fn fixture_unknown_event_invalidates_nothing() {
        let event = parse_fixture("unknown_event.json");
        assert_eq!(event.kind(), EventType::Unknown);
        assert_eq!(event.event_type, "CollectionUpdate");
        assert!(route(&event).is_empty());
    }

    #[test]
    fn fixture_pong_is_heartbeat() {
        let event = parse_fixture("pong.json");
        assert!(event.kind().is_heartbeat());
        assert!(event.data.is_null());
        assert!(route(&event).is_empty());
    }

    // --- Client frames ---

    #[test]
    fn heartbeat_frame_matches_fixture() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 30).unwrap();
        let sent: serde_json::Value = serde_json::from_str(&heartbeat_frame(at)).unwrap();
        assert_eq!(sent, load_fixture("ping.json"));
    }
}
