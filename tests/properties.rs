use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

use rview::collate::{base_key, natural_cmp};
use rview::csv_export::{BYTE_ORDER_MARK, serialize_to_csv};
use rview::dataset::{Dataset, Record};
use rview::frequency;
use rview::view::{
    FilterMode, SortDirection, TabularView, apply_filter, apply_sort, paginate,
    toggle_column_visibility,
};

fn keyed_rows(values: &[String]) -> Vec<Record> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Record::new().with("i", i as i64).with("k", v.as_str()))
        .collect()
}

fn indices(rows: &[&Record]) -> Vec<String> {
    rows.iter().map(|r| r.text("i")).collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn filter_keeps_exactly_the_matching_rows(
        values in prop::collection::vec("[a-cA-C ]{0,4}", 0..40),
        needle in "[a-cA-C]{1,2}",
    ) {
        let rows = keyed_rows(&values);
        let kept = apply_filter(&rows, Some("k"), Some(needle.as_str()));
        let lower = needle.to_lowercase();

        let expected: Vec<String> = rows
            .iter()
            .filter(|r| r.text("k").to_lowercase().contains(&lower))
            .map(|r| r.text("i"))
            .collect();
        prop_assert_eq!(indices(&kept), expected);
    }

    #[test]
    fn empty_filter_is_identity(values in prop::collection::vec("[a-c]{0,3}", 0..30)) {
        let rows = keyed_rows(&values);
        let all: Vec<&Record> = rows.iter().collect();
        prop_assert_eq!(apply_filter(&rows, Some("k"), Some("")), all.clone());
        prop_assert_eq!(apply_filter(&rows, None, Some("a")), all);
    }

    #[test]
    fn sort_is_an_ordered_stable_permutation(
        values in prop::collection::vec("[a-cA-C0-9]{0,3}", 0..40),
        descending in any::<bool>(),
    ) {
        let rows = keyed_rows(&values);
        let direction = if descending { SortDirection::Desc } else { SortDirection::Asc };
        let sorted = apply_sort(rows.iter().collect(), Some("k"), direction);
        prop_assert_eq!(sorted.len(), rows.len());

        let mut seen: Vec<String> = indices(&sorted);
        seen.sort();
        let mut all: Vec<String> = (0..rows.len()).map(|i| i.to_string()).collect();
        all.sort();
        prop_assert_eq!(seen, all);

        for pair in sorted.windows(2) {
            let (a, b) = (pair[0].text("k"), pair[1].text("k"));
            let ord = match direction {
                SortDirection::Asc => natural_cmp(&a, &b),
                SortDirection::Desc => natural_cmp(&b, &a),
            };
            prop_assert_ne!(ord, Ordering::Greater);
            if ord == Ordering::Equal {
                let (ia, ib): (i64, i64) = (pair[0].text("i").parse().unwrap(), pair[1].text("i").parse().unwrap());
                prop_assert!(ia < ib);
            }
        }
    }

    #[test]
    fn accented_values_group_by_base_letter(
        values in prop::collection::vec("[aáàAÁÀbBeéEÉnñNÑ .,-]{0,4}", 0..40),
        descending in any::<bool>(),
    ) {
        let rows = keyed_rows(&values);
        let direction = if descending { SortDirection::Desc } else { SortDirection::Asc };
        let sorted = apply_sort(rows.iter().collect(), Some("k"), direction);

        let keys: Vec<String> = sorted.iter().map(|r| base_key(&r.text("k"))).collect();
        for pair in keys.windows(2) {
            match direction {
                SortDirection::Asc => prop_assert!(pair[0] <= pair[1], "{:?} after {:?}", pair[1], pair[0]),
                SortDirection::Desc => prop_assert!(pair[0] >= pair[1], "{:?} after {:?}", pair[1], pair[0]),
            }
        }
    }

    #[test]
    fn collation_is_a_total_order(
        a in "[aáAÁeéEÉnñNÑ0-9 .-]{0,4}",
        b in "[aáAÁeéEÉnñNÑ0-9 .-]{0,4}",
        c in "[aáAÁeéEÉnñNÑ0-9 .-]{0,4}",
    ) {
        prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        prop_assert_eq!(natural_cmp(&a, &b) == Ordering::Equal, a == b);
        if natural_cmp(&a, &b) != Ordering::Greater && natural_cmp(&b, &c) != Ordering::Greater {
            prop_assert_ne!(natural_cmp(&a, &c), Ordering::Greater);
        }
    }

    #[test]
    fn pages_stay_in_bounds_and_cover_everything(
        len in 0usize..500,
        page in 0usize..10,
        page_size in 1usize..150,
    ) {
        let items: Vec<usize> = (0..len).collect();
        let current = paginate(&items, page, page_size);
        prop_assert!(current.items.len() <= page_size);
        prop_assert!(current.page >= 1 && current.page <= current.total_pages);

        let mut joined = Vec::new();
        for p in 1..=current.total_pages {
            joined.extend(paginate(&items, p, page_size).items);
        }
        prop_assert_eq!(joined, items);
    }

    #[test]
    fn window_is_filter_then_sort_then_page(
        values in prop::collection::vec("[a-c0-9]{0,3}", 0..300),
        needle in "[a-c0-9]{0,1}",
        page in 1usize..5,
    ) {
        let rows = keyed_rows(&values);
        let ds = Dataset::new(vec!["i".into(), "k".into()], rows.clone());
        let mut view = TabularView::new(ds);
        view.set_sort(Some("k"), SortDirection::Asc);
        view.set_filter(Some("k"), Some(needle.as_str()), FilterMode::Contains);
        view.set_page(page);

        let expected = paginate(
            &apply_sort(apply_filter(&rows, Some("k"), Some(needle.as_str())), Some("k"), SortDirection::Asc),
            page,
            100,
        );
        let window = view.window();
        prop_assert_eq!(indices(&window.page.items), indices(&expected.items));
        prop_assert_eq!(window.page.page, expected.page);
    }

    #[test]
    fn toggling_twice_restores_visibility(
        visible in prop::collection::vec("[a-e]", 0..5),
        column in "[a-e]",
    ) {
        let visible: HashSet<String> = visible.into_iter().collect();
        let once = toggle_column_visibility(&visible, &column);
        prop_assert_ne!(once.contains(&column), visible.contains(&column));
        prop_assert_eq!(toggle_column_visibility(&once, &column), visible);
    }

    #[test]
    fn csv_output_parses_back_to_the_same_cells(
        values in prop::collection::vec(("[a-z ,;\"\n]{0,8}", "[a-z ,;\"\n]{0,8}"), 0..20),
        semicolon in any::<bool>(),
    ) {
        let delimiter = if semicolon { ';' } else { ',' };
        let rows: Vec<Record> = values
            .iter()
            .map(|(a, b)| Record::new().with("a", a.as_str()).with("b", b.as_str()))
            .collect();
        let out = serialize_to_csv(&rows, &["a", "b"], delimiter);

        let body = out.strip_prefix(BYTE_ORDER_MARK).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .from_reader(body.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        prop_assert_eq!(headers, ["a", "b"]);

        let parsed: Vec<(String, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].to_string(), r[1].to_string())
            })
            .collect();
        prop_assert_eq!(parsed, values);
    }

    #[test]
    fn single_column_csv_keeps_empty_rows(
        values in prop::collection::vec("[a-zñá ,\"]{0,3}", 0..20),
    ) {
        let rows: Vec<Record> = values.iter().map(|v| Record::new().with("zona", v.as_str())).collect();
        let out = serialize_to_csv(&rows, &["zona"], ',');

        let body = out.strip_prefix(BYTE_ORDER_MARK).unwrap();
        let mut reader = csv::ReaderBuilder::new().from_reader(body.as_bytes());
        let parsed: Vec<String> = reader.records().map(|r| r.unwrap()[0].to_string()).collect();
        prop_assert_eq!(parsed, values);
    }

    #[test]
    fn frequency_table_is_ordered_and_bounded(
        values in prop::collection::vec("[a-d ]{0,2}", 0..80),
        top_n in 1usize..6,
    ) {
        let rows = keyed_rows(&values);
        let table = frequency::count(&rows, Some("k"), Some(top_n));
        let distinct: HashSet<&str> = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();

        prop_assert!(table.len() <= top_n);
        prop_assert_eq!(table.distinct_total(), distinct.len());
        prop_assert_eq!(table.len(), std::cmp::min(top_n, distinct.len()));
        for pair in table.entries().windows(2) {
            prop_assert!(pair[0].count >= pair[1].count);
        }

        let full = frequency::count(&rows, Some("k"), None);
        let total: usize = full.entries().iter().map(|e| e.count).sum();
        prop_assert_eq!(total, full.counted());
    }
}
