//! Response time digest encoding.
//!
//! Digests are stored in `stats_samples.latency_digest` using varint
//! encoding. An empty blob means the sample had no reachable device.

use tdigests::{Centroid, TDigest};
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

/// Centroid limit when combining stored digests
const MERGED_CENTROIDS: usize = 100;

/// Serialize a TDigest to bytes for storage.
///
/// Format: [centroid_count: varint] [mean_bits: varint, weight_bits: varint]...
/// Each f64 is stored as its bit representation encoded as a varint u64.
pub fn serialize_tdigest(td: &TDigest) -> Vec<u8> {
    let centroids = td.centroids();
    let mut data = Vec::with_capacity(centroids.len() * 16 + 4);

    let mut buf = varint_encode::u64_buffer();
    data.extend_from_slice(varint_encode::u64(centroids.len() as u64, &mut buf));

    for c in centroids {
        data.extend_from_slice(varint_encode::u64(c.mean.to_bits(), &mut buf));
        data.extend_from_slice(varint_encode::u64(c.weight.to_bits(), &mut buf));
    }

    data
}

/// Deserialize a stored digest. Empty or truncated blobs yield `None`.
pub fn deserialize_tdigest(data: &[u8]) -> Option<TDigest> {
    if data.is_empty() {
        return None;
    }

    let (count, mut remaining) = varint_decode::u64(data).ok()?;
    if count == 0 {
        return None;
    }

    let mut centroids = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let (mean_bits, rest) = varint_decode::u64(remaining).ok()?;
        let (weight_bits, rest) = varint_decode::u64(rest).ok()?;
        remaining = rest;
        centroids.push(Centroid::new(f64::from_bits(mean_bits), f64::from_bits(weight_bits)));
    }

    Some(TDigest::from_centroids(centroids))
}

/// Combine stored digests into one, skipping empty or corrupt blobs.
pub fn merge_stored_digests<'a, I>(blobs: I) -> Option<TDigest>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut centroids: Vec<Centroid> = blobs
        .into_iter()
        .filter_map(deserialize_tdigest)
        .flat_map(|td| {
            td.centroids()
                .iter()
                .map(|c| Centroid::new(c.mean, c.weight))
                .collect::<Vec<_>>()
        })
        .collect();

    if centroids.is_empty() {
        return None;
    }

    centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
    let mut td = TDigest::from_centroids(centroids);
    td.compress(MERGED_CENTROIDS);
    Some(td)
}

/// Get TDigest statistics: (min, max, sum, count)
/// Computed from centroids since tdigests crate doesn't expose these directly.
pub fn get_tdigest_stats(td: &TDigest) -> (f64, f64, f64, f64) {
    let centroids = td.centroids();
    if centroids.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut sum = 0.0;
    let mut count = 0.0;

    for c in centroids {
        min = min.min(c.mean);
        max = max.max(c.mean);
        sum += c.mean * c.weight;
        count += c.weight;
    }

    (min, max, sum, count)
}
