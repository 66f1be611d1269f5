use bloomfilter::Bloom;
use log::debug;

// A ring of bloom filters, generalized from shadowsocks-libev's `ppbloom`
//
// Each slot holds `capacity / slots` entries. When the current slot is full,
// the oldest slot is cleared and becomes current, so the ring always remembers
// at least `capacity - capacity / slots` of the latest entries.
#[derive(Debug)]
pub struct BloomRing {
    blooms: Vec<Bloom<[u8]>>,
    current_count: usize,
    slot_capacity: usize,
    current: usize,
}

impl BloomRing {
    pub fn new(slots: usize, capacity: usize, fp_p: f64) -> Result<Self, &'static str> {
        if !(fp_p > 0.0 && fp_p < 1.0) {
            return Err("false positive rate must be in (0, 1)");
        }

        let slots = slots.max(1);
        let slot_capacity = (capacity / slots).max(1);

        let mut blooms = Vec::with_capacity(slots);
        for _ in 0..slots {
            blooms.push(Bloom::new_for_fp_rate(slot_capacity, fp_p)?);
        }

        Ok(Self {
            blooms,
            current_count: 0,
            slot_capacity,
            current: 0,
        })
    }

    // Check if data in `buf` exist in any of the slots.
    pub fn check(&self, buf: &[u8]) -> bool {
        self.blooms.iter().any(|bloom| bloom.check(buf))
    }

    // Set `buf` into the current slot.
    pub fn add(&mut self, buf: &[u8]) {
        if self.current_count >= self.slot_capacity {
            // Current slot is full, recycle the oldest one
            self.current = (self.current + 1) % self.blooms.len();

            self.current_count = 0;
            self.blooms[self.current].clear();

            debug!(
                "bloom filter based replay protector slot full, each capacity: {}, total slots: {}",
                self.slot_capacity,
                self.blooms.len(),
            );
        }

        self.blooms[self.current].set(buf);
        self.current_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32) -> [u8; 16] {
        let mut k = [0u8; 16];
        k[..4].copy_from_slice(&i.to_be_bytes());
        k[12..].copy_from_slice(&(!i).to_le_bytes());
        k
    }

    #[test]
    fn remembers_added_entries() {
        let mut ring = BloomRing::new(4, 400, 1e-9).unwrap();
        for i in 0..300 {
            ring.add(&key(i));
        }
        for i in 0..300 {
            assert!(ring.check(&key(i)), "entry {} forgotten", i);
        }
    }

    #[test]
    fn rejects_bad_rate() {
        for fp_p in [0.0, 1.0, 1.5, -0.1, f64::NAN] {
            assert!(BloomRing::new(2, 1000, fp_p).is_err(), "{} accepted", fp_p);
        }
    }

    #[test]
    fn oldest_slot_evicted() {
        let mut ring = BloomRing::new(2, 20, 1e-9).unwrap();

        // Fill slot 0, then slot 1
        for i in 0..20 {
            ring.add(&key(i));
        }
        assert!(ring.check(&key(0)));

        // Wraps around and clears slot 0
        ring.add(&key(100));
        for i in 0..10 {
            assert!(!ring.check(&key(i)), "entry {} survived eviction", i);
        }
        for i in 10..20 {
            assert!(ring.check(&key(i)));
        }
        assert!(ring.check(&key(100)));
    }
}
