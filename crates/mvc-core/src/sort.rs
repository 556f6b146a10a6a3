use std::cmp::Ordering;

/// Stable in-place insertion sort with a custom comparator.
///
/// Returns `true` when at least one adjacent pair was found out of order,
/// i.e. the slice was not already sorted. Equal elements keep their relative
/// order and never count as an inversion.
///
/// # Examples
///
/// ```
/// use mvc_core::sort::insertion_sort_by;
///
/// let mut arr = vec![3, 1, 2];
/// assert!(insertion_sort_by(&mut arr, |a, b| a.cmp(b)));
/// assert_eq!(arr, vec![1, 2, 3]);
/// assert!(!insertion_sort_by(&mut arr, |a, b| a.cmp(b)));
/// ```
pub fn insertion_sort_by<T, F>(arr: &mut [T], mut compare: F) -> bool
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut inverted = false;
    for i in 1..arr.len() {
        let mut j = i;
        while j > 0 && compare(&arr[j - 1], &arr[j]) == Ordering::Greater {
            arr.swap(j - 1, j);
            inverted = true;
            j -= 1;
        }
    }
    inverted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_single() {
        let mut empty: Vec<i32> = vec![];
        assert!(!insertion_sort_by(&mut empty, |a, b| a.cmp(b)));
        let mut one = vec![1];
        assert!(!insertion_sort_by(&mut one, |a, b| a.cmp(b)));
    }

    #[test]
    fn test_descending() {
        let mut arr = vec![3, 1, 4, 1, 5];
        assert!(insertion_sort_by(&mut arr, |a, b| b.cmp(a)));
        assert_eq!(arr, vec![5, 4, 3, 1, 1]);
    }

    #[test]
    fn test_stable() {
        let mut arr = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        insertion_sort_by(&mut arr, |a, b| a.0.cmp(&b.0));
        assert_eq!(arr, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn test_equal_elements_not_inverted() {
        let mut arr = vec![(1, 'x'), (1, 'y')];
        assert!(!insertion_sort_by(&mut arr, |a, b| a.0.cmp(&b.0)));
        assert_eq!(arr, vec![(1, 'x'), (1, 'y')]);
    }
}
