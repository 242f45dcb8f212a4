//! Fixed-size batch splitting

/// Split `items` into consecutive batches of at most `max_size` items.
///
/// Every batch except possibly the last holds exactly `max_size` items and
/// concatenating the batches yields `items` unchanged. An empty input yields
/// no batches at all. A `max_size` of zero is treated as one.
pub fn split<T>(items: Vec<T>, max_size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let max_size = max_size.max(1);
    if items.len() <= max_size {
        return vec![items];
    }

    let mut batches = Vec::with_capacity(items.len().div_ceil(max_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(max_size).collect());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(n: usize) -> Vec<String> {
        (b'a'..=b'z')
            .take(n)
            .map(|c| (c as char).to_string())
            .collect()
    }

    #[test]
    fn test_split_empty() {
        let batches = split(Vec::<String>::new(), 10);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_split_small_list() {
        let batches = split(letters(3), 10);
        assert_eq!(batches, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_split_exactly_one_batch() {
        let batches = split(letters(10), 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], letters(10));
    }

    #[test]
    fn test_split_even_list() {
        let batches = split(letters(20), 10);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], letters(10));
        assert_eq!(batches[1], letters(20)[10..].to_vec());
    }

    #[test]
    fn test_split_uneven_list() {
        let batches = split(letters(12), 10);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1], vec!["k", "l"]);
    }

    #[test]
    fn test_split_zero_max_size() {
        let batches = split(letters(3), 0);
        assert_eq!(batches, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_split_invariants() {
        for len in 0..=26 {
            for max_size in 1..=12 {
                let items = letters(len);
                let batches = split(items.clone(), max_size);

                let expected_batches = len.div_ceil(max_size);
                assert_eq!(batches.len(), expected_batches, "len={len} max={max_size}");

                if let Some((last, full)) = batches.split_last() {
                    assert!(full.iter().all(|b| b.len() == max_size));
                    assert!(!last.is_empty() && last.len() <= max_size);
                }

                let joined: Vec<String> = batches.into_iter().flatten().collect();
                assert_eq!(joined, items);
            }
        }
    }
}
