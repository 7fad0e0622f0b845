//! Short unique IDs for published messages.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const DIGITS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generates IDs from a counter, the current time and a random mask.
///
/// IDs from one generator do not repeat until the counter wraps within
/// the same second.
#[derive(Debug)]
pub struct IdGenerator {
    counter: AtomicU32,
    mask: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            mask: rand::rng().random::<u64>() >> 24,
        }
    }

    /// A new ID. With a non-empty `req_id` the result is `"{req_id}@{id}"`,
    /// tying a response to its request.
    pub fn make_id(&self, req_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let id = (u64::from(secs.swap_bytes()) << 8) ^ u64::from(n) ^ self.mask;

        let mut out = String::with_capacity(req_id.len() + 12);
        if !req_id.is_empty() {
            out.push_str(req_id);
            out.push('@');
        }
        push_base64(&mut out, id);
        out
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends `n` in the ID alphabet, most significant digit first.
fn push_base64(out: &mut String, mut n: u64) {
    let mut buf = [0u8; 11];
    let mut len = 0;
    loop {
        buf[len] = DIGITS[(n % 64) as usize];
        len += 1;
        n /= 64;
        if n == 0 {
            break;
        }
    }
    out.extend(buf[..len].iter().rev().map(|&b| char::from(b)));
}
