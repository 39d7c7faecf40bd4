//! Consistent hashing ring.
//!
//! Every endpoint owns `replicas` virtual positions on a `u64` ring, at `hash(address ++ salt)` for each salt
//! in `0..replicas`. A key is owned by the first position at or after its own position, wrapping around.
//! Adding or removing an endpoint only touches its own positions, so only the keys falling into them move.
//!
//! When a partition count is set, keys are first folded into that many partitions and the partition,
//! not the key, is placed on the ring.
//!
//! Positions come from [`RingHasher`] unless another hasher is given, so proxies built from different
//! toolchains agree on where every key lands.

use std::{
    collections::{btree_map::Entry, BTreeMap, HashMap},
    hash::Hasher,
    marker::PhantomData,
    sync::Arc,
};

use affinitygate_model::Endpoint;

/// Stable placement hash: the first eight bytes of a BLAKE3 digest of everything written, little endian.
#[derive(Debug, Clone, Default)]
pub struct RingHasher(blake3::Hasher);

impl Hasher for RingHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        let [b0, b1, b2, b3, b4, b5, b6, b7, ..] = *self.0.finalize().as_bytes();
        u64::from_le_bytes([b0, b1, b2, b3, b4, b5, b6, b7])
    }
}

/// A ring of virtual positions, generic over the hasher placing them.
pub struct HashRing<H = RingHasher> {
    /// ring position -> owning address
    positions: BTreeMap<u64, Arc<str>>,
    /// address -> positions it actually owns
    members: HashMap<Arc<str>, Vec<u64>>,
    replicas: u16,
    partitions: u32,
    hasher: PhantomData<fn() -> H>,
}

impl<H> std::fmt::Debug for HashRing<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("members", &self.members.len())
            .field("positions", &self.positions.len())
            .field("replicas", &self.replicas)
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl<H> Clone for HashRing<H> {
    fn clone(&self) -> Self {
        Self {
            positions: self.positions.clone(),
            members: self.members.clone(),
            replicas: self.replicas,
            partitions: self.partitions,
            hasher: PhantomData,
        }
    }
}

impl HashRing {
    /// Create an empty ring with the default hasher.
    pub fn new(replicas: u16, partitions: u32) -> Self {
        Self::with_hasher(replicas, partitions)
    }
}

impl<H> HashRing<H>
where
    H: Hasher + Default,
{
    /// Create an empty ring. `replicas` is clamped to at least one, `partitions == 0` disables partitioning.
    pub fn with_hasher(replicas: u16, partitions: u32) -> Self {
        Self {
            positions: BTreeMap::new(),
            members: HashMap::new(),
            replicas: replicas.max(1),
            partitions,
            hasher: PhantomData,
        }
    }

    /// Insert the virtual positions of an endpoint. Returns `false` if it was already a member.
    pub fn add(&mut self, endpoint: &Endpoint) -> bool {
        let address = endpoint.shared_address();
        if self.members.contains_key(address) {
            return false;
        }
        let mut owned = Vec::with_capacity(self.replicas as usize);
        for salt in 0..self.replicas {
            let position = vnode_position::<H>(address, salt);
            match self.positions.entry(position) {
                Entry::Vacant(entry) => {
                    entry.insert(address.clone());
                    owned.push(position);
                }
                Entry::Occupied(entry) => {
                    tracing::debug!(%address, owner = %entry.get(), position, "[AG.Ring] position collision");
                }
            }
        }
        self.members.insert(address.clone(), owned);
        true
    }

    /// Delete every virtual position of an address. Returns `false` if it was not a member.
    pub fn remove(&mut self, address: &str) -> bool {
        let Some(owned) = self.members.remove(address) else {
            return false;
        };
        for position in owned {
            self.positions.remove(&position);
        }
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.members.contains_key(address)
    }

    /// Number of member endpoints.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of virtual positions on the ring.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn members(&self) -> impl Iterator<Item = &Arc<str>> + '_ {
        self.members.keys()
    }

    /// Where a key lands on the ring.
    pub fn key_position(&self, key: &[u8]) -> u64 {
        let hash = hash_parts::<H>(&[key]);
        if self.partitions == 0 {
            hash
        } else {
            let partition = hash % u64::from(self.partitions);
            hash_parts::<H>(&[&partition.to_le_bytes()])
        }
    }

    /// The address owning `key`, `None` when the ring is empty.
    pub fn locate(&self, key: &str) -> Option<&Arc<str>> {
        let position = self.key_position(key.as_bytes());
        self.positions.range(position..).chain(self.positions.range(..position)).map(|(_, address)| address).next()
    }

    /// Distinct owners in clockwise order, starting with the owner of `key`.
    ///
    /// Every member is yielded exactly once, as long as it still owns at least one position.
    pub fn walk(&self, key: &str) -> impl Iterator<Item = &Arc<str>> + '_ {
        let position = self.key_position(key.as_bytes());
        let distinct = self.members.len();
        let mut seen: Vec<&Arc<str>> = Vec::with_capacity(distinct);
        self.positions
            .range(position..)
            .chain(self.positions.range(..position))
            .map(|(_, address)| address)
            .filter(move |address| {
                if seen.contains(address) {
                    false
                } else {
                    seen.push(*address);
                    true
                }
            })
            .take(distinct)
    }
}

fn hash_parts<H: Hasher + Default>(parts: &[&[u8]]) -> u64 {
    let mut hasher = H::default();
    for part in parts {
        hasher.write(part);
    }
    hasher.finish()
}

fn vnode_position<H: Hasher + Default>(address: &str, salt: u16) -> u64 {
    hash_parts::<H>(&[address.as_bytes(), salt.to_string().as_bytes()])
}
