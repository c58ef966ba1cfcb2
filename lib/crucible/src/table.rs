//! The key space: a string-to-string map built on two open-chaining tables
//! with progressive rehashing. Growing never stops the world; every
//! operation relinks a bounded number of entries from the draining table
//! into the new one, so per-operation latency stays flat regardless of map
//! size.

use std::mem;

/// Bucket count for a freshly allocated table.
const INITIAL_BUCKETS: usize = 4;
/// Entries-per-bucket ceiling that triggers a doubling migration.
const MAX_LOAD_FACTOR: usize = 8;
/// Upper bound on relink work performed per operation.
const MIGRATE_BUDGET: usize = 128;
/// Chain terminator and vacant-bucket marker.
const NIL: u32 = u32::MAX;

/// FNV-1a hash of the key bytes. The low 32 bits carry the information; the
/// value is widened into the entry's 64-bit hash slot.
#[inline]
pub fn hash_key(key: &[u8]) -> u64 {
    let mut hash: u32 = 0x811C_9DC5;

    for &byte in key {
        hash = hash.wrapping_add(u32::from(byte)).wrapping_mul(0x0100_0193);
    }

    u64::from(hash)
}

/// A stored pair plus its chain linkage. Entries live in the slot arena and
/// are threaded into bucket chains by slot index, so relinking an entry
/// never moves its key or value bytes.
struct Entry {
    next: u32,
    hash: u64,
    key: Vec<u8>,
    value: Vec<u8>,
}

/// One bucket array. `buckets` stays empty until the table is allocated; an
/// allocated table always has a power-of-two length with `mask = len - 1`.
struct Inner {
    buckets: Vec<u32>,
    mask: usize,
    len: usize,
}

impl Inner {
    #[inline]
    fn unallocated() -> Inner {
        Inner {
            buckets: Vec::new(),
            mask: 0,
            len: 0,
        }
    }

    #[inline]
    fn with_buckets(count: usize) -> Inner {
        debug_assert!(count.is_power_of_two());

        Inner {
            buckets: vec![NIL; count],
            mask: count - 1,
            len: 0,
        }
    }

    #[inline]
    fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    #[inline]
    fn bucket(&self, hash: u64) -> usize {
        hash as usize & self.mask
    }
}

/// The map proper. `primary` receives all inserts; while a migration is in
/// flight `secondary` holds the not-yet-relinked remainder of the previous
/// generation and the logical content is the union of both, with no key in
/// two places at once.
pub struct Table {
    primary: Inner,
    secondary: Inner,
    slots: Vec<Option<Entry>>,
    free: Vec<u32>,
    migrate_pos: usize,
}

impl Table {
    #[inline]
    pub fn new() -> Table {
        Table {
            primary: Inner::unallocated(),
            secondary: Inner::unallocated(),
            slots: Vec::new(),
            free: Vec::new(),
            migrate_pos: 0,
        }
    }

    /// The number of stored entries across both tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.primary.len + self.secondary.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the value stored under `key`.
    pub fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        self.migrate_step();

        let hash = hash_key(key);
        let slot = self.find(hash, key)?;

        Some(self.entry(slot).value.as_slice())
    }

    /// Store `value` under `key`. An existing entry has its value replaced in
    /// place; a new entry is linked at the head of its primary bucket.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        let hash = hash_key(key);

        if let Some(slot) = self.find(hash, key) {
            let entry = self.entry_mut(slot);
            entry.value.clear();
            entry.value.extend_from_slice(value);
            self.migrate_step();
            return;
        }

        if !self.primary.is_allocated() {
            self.primary = Inner::with_buckets(INITIAL_BUCKETS);
        }

        let slot = self.alloc_entry(hash, key, value);
        let bucket = self.primary.bucket(hash);
        let head = self.primary.buckets[bucket];
        self.entry_mut(slot).next = head;
        self.primary.buckets[bucket] = slot;
        self.primary.len += 1;

        // The load check is skipped while a migration is already in flight.
        if !self.secondary.is_allocated()
            && self.primary.len / self.primary.buckets.len() >= MAX_LOAD_FACTOR
        {
            self.begin_migration();
        }

        self.migrate_step();
    }

    /// Detach the entry stored under `key`. Returns true when an entry was
    /// removed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.migrate_step();

        let hash = hash_key(key);

        self.detach(true, hash, key) || self.detach(false, hash, key)
    }

    /// Probe primary then secondary. The cached hash gates the byte compare.
    fn find(&self, hash: u64, key: &[u8]) -> Option<u32> {
        self.probe(&self.primary, hash, key)
            .or_else(|| self.probe(&self.secondary, hash, key))
    }

    fn probe(&self, table: &Inner, hash: u64, key: &[u8]) -> Option<u32> {
        if !table.is_allocated() {
            return None;
        }

        let mut slot = table.buckets[table.bucket(hash)];

        while slot != NIL {
            let entry = self.entry(slot);

            if entry.hash == hash && entry.key[..] == *key {
                return Some(slot);
            }

            slot = entry.next;
        }

        None
    }

    /// Unlink and release the matching entry in the selected table, if any.
    fn detach(&mut self, primary: bool, hash: u64, key: &[u8]) -> bool {
        let (bucket, head) = {
            let table = if primary { &self.primary } else { &self.secondary };

            if !table.is_allocated() {
                return false;
            }

            let bucket = table.bucket(hash);
            (bucket, table.buckets[bucket])
        };

        let mut prev = NIL;
        let mut slot = head;

        while slot != NIL {
            let entry = self.entry(slot);

            if entry.hash == hash && entry.key[..] == *key {
                break;
            }

            prev = slot;
            slot = entry.next;
        }

        if slot == NIL {
            return false;
        }

        let next = self.entry(slot).next;

        if prev == NIL {
            let table = if primary { &mut self.primary } else { &mut self.secondary };
            table.buckets[bucket] = next;
        } else {
            self.entry_mut(prev).next = next;
        }

        {
            let table = if primary { &mut self.primary } else { &mut self.secondary };
            table.len -= 1;
        }

        self.slots[slot as usize] = None;
        self.free.push(slot);

        true
    }

    /// Swap the full primary aside and allocate a double-size replacement.
    fn begin_migration(&mut self) {
        debug_assert!(!self.secondary.is_allocated());

        let doubled = Inner::with_buckets(self.primary.buckets.len() * 2);
        self.secondary = mem::replace(&mut self.primary, doubled);
        self.migrate_pos = 0;
    }

    /// Relink up to `MIGRATE_BUDGET` entries from the draining table into the
    /// primary. Skipping an empty bucket only advances the cursor and is not
    /// charged against the budget. Once the secondary drains, its bucket
    /// array is released.
    fn migrate_step(&mut self) {
        if !self.secondary.is_allocated() {
            return;
        }

        let mut moved = 0;

        while moved < MIGRATE_BUDGET && self.secondary.len > 0 {
            let slot = self.secondary.buckets[self.migrate_pos];

            if slot == NIL {
                self.migrate_pos += 1;
                continue;
            }

            // Detach the chain head and rewire it into the primary. The
            // entry itself never moves.
            let (next, hash) = {
                let entry = self.entry(slot);
                (entry.next, entry.hash)
            };

            self.secondary.buckets[self.migrate_pos] = next;
            self.secondary.len -= 1;

            let bucket = self.primary.bucket(hash);
            let head = self.primary.buckets[bucket];
            self.entry_mut(slot).next = head;
            self.primary.buckets[bucket] = slot;
            self.primary.len += 1;

            moved += 1;
        }

        if self.secondary.len == 0 {
            self.secondary = Inner::unallocated();
            self.migrate_pos = 0;
        }
    }

    fn alloc_entry(&mut self, hash: u64, key: &[u8], value: &[u8]) -> u32 {
        let entry = Entry {
            next: NIL,
            hash,
            key: key.to_vec(),
            value: value.to_vec(),
        };

        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                (self.slots.len() - 1) as u32
            }
        }
    }

    #[inline]
    fn entry(&self, slot: u32) -> &Entry {
        self.slots[slot as usize]
            .as_ref()
            .expect("Vacant slot linked in a bucket chain")
    }

    #[inline]
    fn entry_mut(&mut self, slot: u32) -> &mut Entry {
        self.slots[slot as usize]
            .as_mut()
            .expect("Vacant slot linked in a bucket chain")
    }
}
