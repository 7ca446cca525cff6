use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initialize the snowflake id generator.
///
/// `machine_id` and `node_id` are both in 0-31. Calling this is optional;
/// an uninitialized generator falls back to (1, 1).
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR.lock().unwrap();
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Next snowflake id as a decimal string.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR.lock().unwrap();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

/// Next diagnosis id (`DIAG-<snowflake>`), used by the diagnosis engine.
pub fn next_diagnosis_id() -> String {
    format!("DIAG-{}", next_id())
}
