#![allow(dead_code)]

use traffic_reroute::NetworkDescription;

/// Two ways from `B` to `F`: through `E`, or around through `G` and `H`.
/// Every edge is 100 m long with a 10 m/s speed limit.
pub const TOY_NETWORK: &str = r#"{
    "edges": [
        { "id": "D", "length": 100.0, "speed_limit": 10.0 },
        { "id": "A", "length": 100.0, "speed_limit": 10.0 },
        { "id": "C", "length": 100.0, "speed_limit": 10.0 },
        { "id": "B", "length": 100.0, "speed_limit": 10.0, "lanes": 2 },
        { "id": "E", "length": 100.0, "speed_limit": 10.0 },
        { "id": "G", "length": 100.0, "speed_limit": 10.0 },
        { "id": "H", "length": 100.0, "speed_limit": 10.0 },
        { "id": "F", "length": 100.0, "speed_limit": 10.0 }
    ],
    "connections": [
        { "from": "D", "to": "A" },
        { "from": "A", "to": "B", "to_lane": 0 },
        { "from": "A", "to": "B", "to_lane": 1 },
        { "from": "C", "to": "B", "to_lane": 1 },
        { "from": "B", "from_lane": 0, "to": "E" },
        { "from": "B", "from_lane": 1, "to": "G" },
        { "from": "E", "to": "F" },
        { "from": "G", "to": "H" },
        { "from": "H", "to": "F" }
    ]
}"#;

pub fn toy_network() -> NetworkDescription {
    NetworkDescription::from_json(TOY_NETWORK).unwrap()
}

/// A unique path in the temp directory.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("traffic-reroute-{}-{}", std::process::id(), name))
}
