//! Merging of snapshot and stream result sets.

use std::collections::HashMap;

use super::models::DeviceAvailabilityResult;

/// Merge the persisted snapshot with results streamed from a running check.
///
/// Snapshot order is kept; stream-only devices are appended in stream order.
/// A stream entry replaces a known device only when its timestamp is strictly
/// later. Unparsable timestamps count as older than any parsable one.
pub fn merge(
    snapshot: Option<&[DeviceAvailabilityResult]>,
    stream: Option<&[DeviceAvailabilityResult]>,
) -> Vec<DeviceAvailabilityResult> {
    let (snapshot, stream) = match (snapshot, stream) {
        (None, stream) => return stream.map(<[_]>::to_vec).unwrap_or_default(),
        (Some(snapshot), None) => return snapshot.to_vec(),
        (Some(snapshot), Some(stream)) => (snapshot, stream),
    };

    let mut result: Vec<DeviceAvailabilityResult> = Vec::with_capacity(snapshot.len() + stream.len());
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(snapshot.len() + stream.len());

    for entry in snapshot.iter().chain(stream.iter()) {
        upsert(&mut result, &mut index, entry);
    }

    result
}

fn upsert(
    result: &mut Vec<DeviceAvailabilityResult>,
    index: &mut HashMap<i64, usize>,
    entry: &DeviceAvailabilityResult,
) {
    match index.get(&entry.device_id) {
        Some(&pos) => {
            // Option<DateTime> orders None first
            if entry.parsed_timestamp() > result[pos].parsed_timestamp() {
                result[pos] = entry.clone();
            }
        }
        None => {
            index.insert(entry.device_id, result.len());
            result.push(entry.clone());
        }
    }
}
