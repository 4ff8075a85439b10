use std::cmp::Ordering;

pub trait BaseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Less than
    fn lt(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Less than or equal
    fn le(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) != Ordering::Greater
    }

    /// Greater than
    fn gt(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// Greater than or equal
    fn ge(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) != Ordering::Less
    }

    /// Equal
    fn eq(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

pub trait Comparator: BaseComparator {
    /// The name of the comparator. Used to check for comparator
    /// mismatches (i.e., a DB created with one comparator is
    /// accessed using a different comparator.
    ///
    /// The client of this package should switch to a new name whenever
    /// the comparator implementation changes in a way that will cause
    /// the relative ordering of any two keys to change.
    fn name(&self) -> &'static str;
}

/// Lexicographic byte-wise ordering, the fallback when no comparator is supplied.
#[derive(Default, Clone)]
pub struct BytewiseComparatorImpl;

impl BytewiseComparatorImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaseComparator for BytewiseComparatorImpl {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

impl Comparator for BytewiseComparatorImpl {
    fn name(&self) -> &'static str {
        "dakv.BytewiseComparator"
    }
}

/// Returns true if the closed ranges `[a_start, a_limit]` and
/// `[b_start, b_limit]` share at least one key.
pub fn ranges_overlap(
    cmp: &dyn Comparator,
    a_start: &[u8],
    a_limit: &[u8],
    b_start: &[u8],
    b_limit: &[u8],
) -> bool {
    !(cmp.lt(a_limit, b_start) || cmp.lt(b_limit, a_start))
}

#[cfg(test)]
mod test {
    use super::*;

    struct ReverseComparator;

    impl BaseComparator for ReverseComparator {
        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }
    }

    impl Comparator for ReverseComparator {
        fn name(&self) -> &'static str {
            "test.Reverse"
        }
    }

    #[test]
    fn test_bytewise() {
        let c = BytewiseComparatorImpl::new();
        assert!(c.lt(b"a", b"b"));
        assert!(c.lt(b"a", b"aa"));
        assert!(c.le(b"a", b"a"));
        assert!(c.gt(b"b", b"abc"));
        assert!(c.eq(b"", b""));
    }

    #[test]
    fn test_ranges_overlap() {
        let c = BytewiseComparatorImpl::new();
        assert!(ranges_overlap(&c, b"a", b"c", b"c", b"d"));
        assert!(ranges_overlap(&c, b"b", b"b", b"a", b"z"));
        assert!(!ranges_overlap(&c, b"a", b"b", b"c", b"d"));
        let r = ReverseComparator;
        // under the reversed order "d" < "a"
        assert!(ranges_overlap(&r, b"d", b"a", b"c", b"b"));
        assert!(!ranges_overlap(&r, b"z", b"x", b"c", b"a"));
    }
}
