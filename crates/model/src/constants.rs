pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SERVICE_PORT: &str = "8080";

pub const DEFAULT_AFFINITY_HEADER: &str = "X-Affinity";
pub const DEFAULT_LISTEN_PORT: u16 = 8081;

pub const DEFAULT_REPLICAS: u16 = 20;
pub const DEFAULT_PARTITIONS: u32 = 71;
pub const DEFAULT_LOAD_SLACK: f64 = 0.25;
