// Property: resolved ranges stay inside the requested window and, for
// open-ended requests, inside the resource

use feedit::error::FeedError;
use feedit::range_resolver::RangeResolver;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Without a Range header the window starts at 0 and never exceeds
    /// either the window or the resource
    #[test]
    fn prop_absent_range_fits_window_and_size(
        size in 1u64..=1_000_000_000,
        window in 1u64..=100_000_000,
    ) {
        let range = RangeResolver::resolve(None, size, window).unwrap();

        prop_assert_eq!(range.start, 0);
        prop_assert_eq!(range.size(), window.min(size));
        prop_assert!(range.end < size);
    }

    /// Open-ended ranges start where asked and are clamped to the last byte
    #[test]
    fn prop_open_range_clamped(
        size in 1u64..=1_000_000_000,
        start_frac in 0.0f64..1.0,
        window in 1u64..=100_000_000,
    ) {
        let start = ((size as f64) * start_frac) as u64;
        let start = start.min(size - 1);
        let header = format!("bytes={}-", start);

        let range = RangeResolver::resolve(Some(&header), size, window).unwrap();

        prop_assert_eq!(range.start, start);
        prop_assert!(range.end < size);
        prop_assert!(range.size() <= window);
        prop_assert!(range.end == size - 1 || range.size() == window);
    }

    /// Explicit bounds come back exactly as requested
    #[test]
    fn prop_explicit_range_verbatim(
        start in 0u64..=u64::MAX / 2,
        len in 0u64..=1_000_000_000,
        size in 1u64..=1_000_000,
        window in 1u64..=1_000_000,
    ) {
        let end = start + len;
        let header = format!("bytes={}-{}", start, end);

        let range = RangeResolver::resolve(Some(&header), size, window).unwrap();

        prop_assert_eq!(range.start, start);
        prop_assert_eq!(range.end, end);
    }

    /// Explicit ends at the top of the u64 range never overflow the length
    #[test]
    fn prop_end_at_u64_max(
        start in prop_oneof![Just(0u64), Just(1u64), any::<u64>()],
        size in 1u64..=1_000_000,
        window in 1u64..=1_000_000,
    ) {
        let header = format!("bytes={}-{}", start, u64::MAX);
        let result = RangeResolver::resolve(Some(&header), size, window);

        if start == 0 {
            prop_assert!(matches!(result, Err(FeedError::InvalidRange(_))));
        } else {
            let range = result.unwrap();
            prop_assert_eq!((range.start, range.end), (start, u64::MAX));
            prop_assert_eq!(range.size(), u64::MAX - start + 1);
        }
    }

    /// Only the first segment of a multi-range header is used
    #[test]
    fn prop_first_segment_wins(
        a in 0u64..1000,
        b in 0u64..1000,
        c in 0u64..1000,
    ) {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let header = format!("bytes={}-{},{}-", start, end, c);

        let range = RangeResolver::resolve(Some(&header), 1000, 10).unwrap();

        prop_assert_eq!((range.start, range.end), (start, end));
    }

    /// Open-ended starts at or past the end are unsatisfiable
    #[test]
    fn prop_start_beyond_size_unsatisfiable(
        size in 0u64..=1_000_000,
        past in 0u64..=1_000_000,
        window in 1u64..=1_000_000,
    ) {
        let header = format!("bytes={}-", size + past);
        let result = RangeResolver::resolve(Some(&header), size, window);

        prop_assert!(matches!(result, Err(FeedError::UnsatisfiableRange(_))));
    }

    /// Garbage never panics and never yields a range
    #[test]
    fn prop_garbage_is_an_error(spec in "bytes=[a-z]{1,8}-[a-z]{0,8}") {
        let result = RangeResolver::resolve(Some(&spec), 1000, 100);
        prop_assert!(matches!(result, Err(FeedError::InvalidRange(_))));
    }
}
