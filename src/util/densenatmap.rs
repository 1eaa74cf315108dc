//! Private module for selective re-export.

use std::marker::PhantomData;
use std::ops::Index;

/// A map whose keys are exactly the range `[0..self.len()]`. Serves the same purpose as a
/// [`Vec`]`<V>` but indexing by a key of the wrong type is a type error.
///
/// Keys must be inserted in order: first the key corresponding with `0`, then `1`, and so on.
/// **Inserting out of order will panic**.
///
/// ```rust
/// # use actorcheck::ActorId;
/// # use actorcheck::util::DenseNatMap;
/// let mut m = DenseNatMap::new();
/// m.insert(ActorId::from(0), "main");
/// m.insert(ActorId::from(1), "child");
/// assert_eq!(m[ActorId::from(1)], "child");
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DenseNatMap<K, V> {
    values: Vec<V>,
    _key: PhantomData<K>,
}

impl<K, V> DenseNatMap<K, V> {
    /// Constructs an empty `DenseNatMap`.
    pub fn new() -> Self {
        DenseNatMap {
            values: Vec::new(),
            _key: PhantomData,
        }
    }

    /// Accepts a key, and returns [`None`] if invalid, otherwise [`Some`]`(value)`.
    pub fn get(&self, key: K) -> Option<&V>
    where
        usize: From<K>,
    {
        self.values.get(usize::from(key))
    }

    /// Inserts a key-value pair and returns [`None`] if no value was previously associated,
    /// otherwise [`Some`]`(previous_value)`. Panics if neither overwriting a key nor inserting at
    /// the end.
    pub fn insert(&mut self, key: K, mut value: V) -> Option<V>
    where
        usize: From<K>,
    {
        let index = usize::from(key);
        if index > self.values.len() {
            panic!("Out of bounds. index={}, len={}", index, self.values.len());
        }
        if index == self.values.len() {
            self.values.push(value);
            return None;
        }
        std::mem::swap(&mut self.values[index], &mut value);
        Some(value)
    }

    /// The key that the next [`DenseNatMap::push`] will use.
    pub fn next_key(&self) -> K
    where
        K: From<usize>,
    {
        K::from(self.values.len())
    }

    /// Appends a value under the next key and returns that key.
    pub fn push(&mut self, value: V) -> K
    where
        K: From<usize>,
    {
        let key = self.next_key();
        self.values.push(value);
        key
    }

    /// Returns an iterator over pairs in the map whereby values are borrowed.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)>
    where
        K: From<usize>,
    {
        self.values.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }

    /// Returns the number of elements in the map.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns an iterator over values in the map.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.values.iter()
    }
}

impl<K, V> Default for DenseNatMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Index<K> for DenseNatMap<K, V>
where
    usize: From<K>,
{
    type Output = V;
    fn index(&self, key: K) -> &Self::Output {
        self.values.index(usize::from(key))
    }
}
