//! History-independent sequence hashing.
//!
//! [`SeqHash<T>`] commits to an ordered sequence of [`Hashable`] elements
//! such that the resulting hash depends only on the sequence's contents
//! and order, never on how sub-sequences were merged together to build
//! it. This lets independent pieces of a computation each accumulate
//! their own partial sequence and be combined later — by whichever
//! pairing is convenient — without perturbing the final commitment.
//!
//! The construction (`doRound`/fringes/top) assigns each element a
//! volatile/stable classification purely from bits of its own content
//! hash, re-drawn a hash-round at a time when the available bits run
//! out. Two adjacent elements merge into one only once every bit
//! decided so far agrees they should, which is what makes the final
//! shape — and therefore the commitment — independent of which pairs
//! were merged first.

use std::rc::Rc;

use ivc_types::Hash;

/// Number of bits a `Hash` offers before a round has to re-hash for more.
const HASH_BITS: u64 = 256;

/// An element that can participate in a [`SeqHash`].
pub trait Hashable {
    fn hash(&self) -> Hash;
}

/// Combines two adjacent elements of a sequence into the element that
/// replaces them. For [`crate`]'s own use (building a `LogTree` out of a
/// flattened call log) this builds the parent node of a Merkle-like
/// binary tree; other sequences may combine differently, but the result
/// must still hash deterministically from its two inputs.
pub trait Combine: Hashable + Sized {
    fn combine(left: Rc<Self>, right: Rc<Self>) -> Rc<Self>;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Unknown,
    MergeLeft,
    MergeRight,
    LeftFringe,
    RightFringe,
}

struct Round<T> {
    left_fringe: Vec<Rc<T>>,
    center: Vec<Rc<T>>,
    right_fringe: Vec<Rc<T>>,
}

/// One round of fringe/merge classification over `elems`. `volatile_left`
/// (`volatile_right`) says whether the left (right) end is still allowed
/// to peel off a fringe element this round; both are false only when
/// collapsing a sequence down to its single root in [`SeqHash::finish`].
fn do_round<T: Combine>(elems: &[Rc<T>], volatile_left: bool, volatile_right: bool) -> Round<T> {
    let n = elems.len();
    let mut kind = vec![Kind::Unknown; n];
    let mut left: i64 = 0;
    let mut right: i64 = n as i64 - 1;
    let mut hashes: Vec<Hash> = elems.iter().map(|e| e.hash()).collect();

    let mut idx: u64 = 0;
    loop {
        if idx > 0 && idx % HASH_BITS == 0 {
            for h in hashes.iter_mut() {
                *h = Hash::sum(h.bytes());
            }
        }

        let mut done = true;
        let bit_at = (idx % HASH_BITS) as usize;

        if volatile_left {
            if left < n as i64 && kind[left as usize] == Kind::Unknown && hashes[left as usize].bit(bit_at) == 0 {
                kind[left as usize] = Kind::LeftFringe;
                left += 1;
            }
            if left < n as i64 && kind[left as usize] == Kind::Unknown {
                done = false;
            }
        }

        if volatile_right {
            if right >= 0 && kind[right as usize] == Kind::Unknown && hashes[right as usize].bit(bit_at) == 1 {
                kind[right as usize] = Kind::RightFringe;
                right -= 1;
            }
            if right >= 0 && kind[right as usize] == Kind::Unknown {
                done = false;
            }
        }

        if n > 0 {
            for j in 0..n - 1 {
                if kind[j] == Kind::Unknown && kind[j + 1] == Kind::Unknown {
                    if hashes[j].bit(bit_at) == 1 && hashes[j + 1].bit(bit_at) == 0 {
                        kind[j] = Kind::MergeLeft;
                        kind[j + 1] = Kind::MergeRight;
                    } else {
                        done = false;
                    }
                }
            }
        }

        if done {
            break;
        }
        idx += 1;
    }

    let mut r = Round {
        left_fringe: Vec::new(),
        center: Vec::new(),
        right_fringe: Vec::new(),
    };
    let mut i = 0;
    while i < n {
        match kind[i] {
            Kind::Unknown => {
                r.center.push(elems[i].clone());
                i += 1;
            }
            Kind::MergeLeft => {
                r.center.push(T::combine(elems[i].clone(), elems[i + 1].clone()));
                i += 2;
            }
            Kind::MergeRight => unreachable!("mergeRight is only ever produced paired with a preceding mergeLeft"),
            Kind::LeftFringe => {
                r.left_fringe.push(elems[i].clone());
                i += 1;
            }
            Kind::RightFringe => {
                r.right_fringe.push(elems[i].clone());
                i += 1;
            }
        }
    }
    r
}

/// A history-independent commitment to an ordered sequence of `T`,
/// realised level-by-level: each level caches the elements that fell off
/// the left and right ends of that round (`left_fringes`/`right_fringes`)
/// so a later `merge` can cheaply re-extend either side without redoing
/// already-settled rounds.
pub struct SeqHash<T> {
    height: i8,
    left_fringes: Vec<Vec<Rc<T>>>,
    top: Vec<Rc<T>>,
    right_fringes: Vec<Vec<Rc<T>>>,
}

impl<T> Clone for SeqHash<T> {
    fn clone(&self) -> Self {
        SeqHash {
            height: self.height,
            left_fringes: self.left_fringes.clone(),
            top: self.top.clone(),
            right_fringes: self.right_fringes.clone(),
        }
    }
}

impl<T> SeqHash<T> {
    pub fn empty() -> SeqHash<T> {
        SeqHash {
            height: 0,
            left_fringes: Vec::new(),
            top: Vec::new(),
            right_fringes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 && self.top.is_empty()
    }
}

impl<T: Combine> SeqHash<T> {
    /// A sequence containing exactly `elem`.
    pub fn new(elem: T) -> SeqHash<T> {
        SeqHash::from_rc(Rc::new(elem))
    }

    pub fn from_rc(elem: Rc<T>) -> SeqHash<T> {
        SeqHash {
            height: 0,
            left_fringes: Vec::new(),
            top: vec![elem],
            right_fringes: Vec::new(),
        }
    }

    /// Concatenates `left` then `right`, building the merged hash level
    /// by level: at each height, prepend whichever side hasn't yet
    /// reached that height's top (its cached fringe), round-classify the
    /// assembled elements, then cache the new fringes and continue one
    /// level up. The final level's leftover elements become `top`.
    pub fn merge(left: &SeqHash<T>, right: &SeqHash<T>) -> SeqHash<T> {
        if left.is_empty() {
            return right.clone();
        }
        if right.is_empty() {
            return left.clone();
        }

        let mut height: i8 = 0;
        let mut left_fringes: Vec<Vec<Rc<T>>> = Vec::new();
        let mut right_fringes: Vec<Vec<Rc<T>>> = Vec::new();
        let mut elems: Vec<Rc<T>> = Vec::new();

        loop {
            if height < left.height {
                let mut prefix = left.right_fringes[height as usize].clone();
                prefix.extend(elems);
                elems = prefix;
            } else if height == left.height {
                let mut prefix = left.top.clone();
                prefix.extend(elems);
                elems = prefix;
            }

            if height < right.height {
                elems.extend(right.left_fringes[height as usize].iter().cloned());
            } else if height == right.height {
                elems.extend(right.top.iter().cloned());
            }

            if height >= left.height && height >= right.height && elems.is_empty() {
                break;
            }

            let round = do_round(&elems, height >= left.height, height >= right.height);
            elems = round.center;

            if height < left.height {
                left_fringes.push(left.left_fringes[height as usize].clone());
            } else {
                left_fringes.push(round.left_fringe);
            }

            if height < right.height {
                right_fringes.push(right.right_fringes[height as usize].clone());
            } else {
                right_fringes.push(round.right_fringe);
            }

            height += 1;
        }

        height -= 1;
        let top_height = height as usize;
        let mut top = left_fringes[top_height].clone();
        top.extend(right_fringes[top_height].iter().cloned());
        left_fringes.truncate(top_height);
        right_fringes.truncate(top_height);

        SeqHash {
            height,
            left_fringes,
            top,
            right_fringes,
        }
    }

    /// Collapses every fringe down to the single root element whose hash
    /// is the sequence's commitment. `None` only for an empty sequence.
    pub fn finish(&self) -> Option<Rc<T>> {
        if self.is_empty() {
            return None;
        }

        let mut left: Vec<Rc<T>> = Vec::new();
        let mut right: Vec<Rc<T>> = Vec::new();

        for i in 0..self.height as usize {
            left.extend(self.left_fringes[i].iter().cloned());
            let mut prefix = self.right_fringes[i].clone();
            prefix.extend(right);
            right = prefix;

            left = do_round(&left, false, false).center;
            right = do_round(&right, false, false).center;
        }

        let mut elems = left;
        elems.extend(self.top.iter().cloned());
        elems.extend(right);

        while elems.len() > 1 {
            elems = do_round(&elems, false, false).center;
        }

        Some(elems.into_iter().next().expect("non-empty SeqHash collapses to one element"))
    }
}

impl<T> Default for SeqHash<T> {
    fn default() -> Self {
        SeqHash::empty()
    }
}

impl<T: Combine> FromIterator<T> for SeqHash<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .map(SeqHash::new)
            .fold(SeqHash::empty(), |acc, s| SeqHash::merge(&acc, &s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Clone)]
    struct IntElem(u64);

    impl Hashable for IntElem {
        fn hash(&self) -> Hash {
            Hash::sum(&self.0.to_le_bytes())
        }
    }

    impl Combine for IntElem {
        fn combine(left: Rc<IntElem>, right: Rc<IntElem>) -> Rc<IntElem> {
            Rc::new(IntElem(left.0.wrapping_mul(31).wrapping_add(right.0)))
        }
    }

    fn random_bracket(elems: &[SeqHash<IntElem>], rng: &mut StdRng) -> SeqHash<IntElem> {
        if elems.len() == 1 {
            return elems[0].clone();
        }
        let split = rng.gen_range(1..elems.len());
        let left = random_bracket(&elems[..split], rng);
        let right = random_bracket(&elems[split..], rng);
        SeqHash::merge(&left, &right)
    }

    #[test]
    fn merge_order_is_commitment_independent() {
        let elems: Vec<SeqHash<IntElem>> = (0..40u64).map(|i| SeqHash::new(IntElem(i))).collect();
        let mut rng = StdRng::seed_from_u64(1234);
        let reference = random_bracket(&elems, &mut rng);
        let reference_hash = reference.finish().unwrap().hash();

        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let bracketed = random_bracket(&elems, &mut rng);
            assert_eq!(bracketed.finish().unwrap().hash(), reference_hash);
        }
    }

    #[test]
    fn single_element_finishes_to_itself() {
        let seq = SeqHash::new(IntElem(7));
        assert_eq!(seq.finish().unwrap().hash(), IntElem(7).hash());
    }

    #[test]
    fn empty_sequence_has_no_finish() {
        let a: SeqHash<IntElem> = SeqHash::empty();
        assert!(a.finish().is_none());
        assert!(a.is_empty());
    }

    #[test]
    fn merging_with_empty_is_identity() {
        let a = SeqHash::new(IntElem(1));
        let b = SeqHash::new(IntElem(2));
        let ab = SeqHash::merge(&a, &b);
        let empty = SeqHash::empty();
        assert_eq!(SeqHash::merge(&empty, &ab).finish().unwrap().hash(), ab.finish().unwrap().hash());
        assert_eq!(SeqHash::merge(&ab, &empty).finish().unwrap().hash(), ab.finish().unwrap().hash());
    }
}
