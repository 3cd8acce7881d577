//! Radix sort of `f32` keys producing an index permutation.
//!
//! Four 8-bit passes over the IEEE bit patterns, least significant byte first. Passes
//! whose byte is the same for every key are skipped. The most significant pass places
//! negative keys first and in reverse order, since their bit patterns grow as the values
//! shrink.
//!
//! The sorter remembers the last permutation. When the next input is already ascending in
//! that order the old permutation is returned untouched, which makes sorting nearly
//! static broadphase keys from one step to the next cheap.

use tracing::trace;

const RADIX: usize = 256;

/// Reusable radix sorter. Buffers grow with the largest input seen and are kept.
#[derive(Debug, Default)]
pub struct RadixSort {
    ranks: Vec<u32>,
    ranks2: Vec<u32>,
    current_size: usize,
    ranks_valid: bool,
}

impl RadixSort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort `keys` ascending and return the permutation: `keys[perm[0]] <= keys[perm[1]] ...`
    ///
    /// The slice stays valid until the next call.
    pub fn sort(&mut self, keys: &[f32]) -> &[u32] {
        let n = keys.len();
        if n != self.current_size {
            if n > self.ranks.len() {
                self.ranks.resize(n, 0);
                self.ranks2.resize(n, 0);
            }
            self.current_size = n;
            self.ranks_valid = false;
        }
        if n == 0 {
            return &self.ranks[..0];
        }

        if self.is_presorted(keys) {
            trace!(n, "radix sort: input already ordered");
            if !self.ranks_valid {
                for (i, rank) in self.ranks[..n].iter_mut().enumerate() {
                    *rank = i as u32;
                }
                self.ranks_valid = true;
            }
            return &self.ranks[..n];
        }

        let bits: &[u32] = bytemuck::cast_slice(keys);
        let histograms = histograms(bits);
        let negative_count: u32 = histograms[3][128..].iter().sum();

        for pass in 0..4 {
            let counts = &histograms[pass];
            let shift = pass * 8;
            // A byte shared by every key carries no ordering information
            let unique = ((bits[0] >> shift) & 0xff) as usize;
            let perform_pass = counts[unique] as usize != n;

            if pass != 3 {
                if perform_pass {
                    let mut link = [0u32; RADIX];
                    for i in 1..RADIX {
                        link[i] = link[i - 1] + counts[i - 1];
                    }
                    self.scatter(n, |id| {
                        let radix = ((bits[id as usize] >> shift) & 0xff) as usize;
                        let slot = link[radix];
                        link[radix] += 1;
                        slot
                    });
                }
            } else if perform_pass {
                let mut link = msb_offsets(counts, negative_count);
                self.scatter(n, |id| {
                    let radix = (bits[id as usize] >> 24) as usize;
                    if radix < 128 {
                        let slot = link[radix];
                        link[radix] += 1;
                        slot
                    } else {
                        link[radix] -= 1;
                        link[radix]
                    }
                });
            } else if unique >= 128 {
                // Every key negative with the same top byte: the order so far is backwards
                if self.ranks_valid {
                    for i in 0..n {
                        self.ranks2[i] = self.ranks[n - 1 - i];
                    }
                } else {
                    for i in 0..n {
                        self.ranks2[i] = (n - 1 - i) as u32;
                    }
                    self.ranks_valid = true;
                }
                std::mem::swap(&mut self.ranks, &mut self.ranks2);
            }
        }

        if !self.ranks_valid {
            for (i, rank) in self.ranks[..n].iter_mut().enumerate() {
                *rank = i as u32;
            }
            self.ranks_valid = true;
        }
        &self.ranks[..n]
    }

    /// Last permutation produced, if still valid for inputs of the current size.
    pub fn ranks(&self) -> Option<&[u32]> {
        self.ranks_valid.then(|| &self.ranks[..self.current_size])
    }

    /// Drop the buffers and forget the remembered order.
    pub fn reset(&mut self) {
        self.ranks = Vec::new();
        self.ranks2 = Vec::new();
        self.current_size = 0;
        self.ranks_valid = false;
    }

    pub fn capacity(&self) -> usize {
        self.ranks.len()
    }

    fn is_presorted(&self, keys: &[f32]) -> bool {
        if self.ranks_valid {
            let ranks = &self.ranks[..keys.len()];
            ranks
                .windows(2)
                .all(|w| !(keys[w[1] as usize] < keys[w[0] as usize]))
        } else {
            keys.windows(2).all(|w| !(w[1] < w[0]))
        }
    }

    /// Run one distribution pass, reading ids in the current order (or natural order on
    /// the first pass) and writing each to the slot `place` returns.
    fn scatter(&mut self, n: usize, mut place: impl FnMut(u32) -> u32) {
        if self.ranks_valid {
            for i in 0..n {
                let id = self.ranks[i];
                self.ranks2[place(id) as usize] = id;
            }
        } else {
            for id in 0..n as u32 {
                self.ranks2[place(id) as usize] = id;
            }
            self.ranks_valid = true;
        }
        std::mem::swap(&mut self.ranks, &mut self.ranks2);
    }
}

fn histograms(bits: &[u32]) -> [[u32; RADIX]; 4] {
    let mut histograms = [[0u32; RADIX]; 4];
    for &b in bits {
        histograms[0][(b & 0xff) as usize] += 1;
        histograms[1][((b >> 8) & 0xff) as usize] += 1;
        histograms[2][((b >> 16) & 0xff) as usize] += 1;
        histograms[3][(b >> 24) as usize] += 1;
    }
    histograms
}

/// Bucket offsets for the sign byte. Positive buckets start after all negatives and fill
/// forwards; negative buckets are laid out in reverse and fill backwards from their end.
fn msb_offsets(counts: &[u32; RADIX], negative_count: u32) -> [u32; RADIX] {
    let mut link = [0u32; RADIX];
    link[0] = negative_count;
    for i in 1..128 {
        link[i] = link[i - 1] + counts[i - 1];
    }
    link[255] = 0;
    for i in 0..127 {
        link[254 - i] = link[255 - i] + counts[255 - i];
    }
    for i in 128..RADIX {
        link[i] += counts[i];
    }
    link
}

/// Reference-counted owner of a [`RadixSort`].
///
/// Every space acquires it on creation and releases it on destruction; the last release
/// frees the buffers.
#[derive(Debug, Default)]
pub struct SortScratch {
    users: usize,
    sorter: RadixSort,
}

impl SortScratch {
    pub fn acquire(&mut self) {
        self.users += 1;
    }

    pub fn release(&mut self) {
        self.users = self.users.saturating_sub(1);
        if self.users == 0 {
            trace!("radix sort scratch released");
            self.sorter.reset();
        }
    }

    pub fn users(&self) -> usize {
        self.users
    }

    pub fn sorter(&mut self) -> &mut RadixSort {
        &mut self.sorter
    }

    pub fn capacity(&self) -> usize {
        self.sorter.capacity()
    }
}
