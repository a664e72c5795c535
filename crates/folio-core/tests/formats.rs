use folio_core::{Format, FormatType, Paragraph, ParagraphType};

fn paragraph(text: &str) -> Paragraph {
    Paragraph::new(ParagraphType::Paragraph).with_text(text)
}

fn assert_interval_invariants(p: &Paragraph) {
    let len = p.len();
    for f in p.formats() {
        assert!(f.from < f.to, "empty range {f:?}");
        assert!(f.to <= len, "range {f:?} past text length {len}");
    }
    for (i, a) in p.formats().iter().enumerate() {
        for b in &p.formats()[i + 1..] {
            if a.kind == b.kind {
                assert!(
                    a.to < b.from || b.to < a.from,
                    "same-type ranges {a:?} and {b:?} touch"
                );
            }
        }
    }
}

#[test]
fn format_toggles_identical_range() {
    let mut p = paragraph("Hello world");

    p.format(Format::new(FormatType::Strong, 0, 5), false).unwrap();
    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 0, 5)]);

    p.format(Format::new(FormatType::Strong, 0, 5), false).unwrap();
    assert!(p.formats().is_empty());
}

#[test]
fn format_splits_other_type_around_candidate() {
    let mut p = paragraph("Hello world").with_formats(vec![Format::new(FormatType::Emphasis, 0, 11)]);

    p.format(Format::new(FormatType::Strong, 3, 7), false).unwrap();

    assert_eq!(
        p.formats(),
        &[
            Format::new(FormatType::Emphasis, 0, 3),
            Format::new(FormatType::Strong, 3, 7),
            Format::new(FormatType::Emphasis, 7, 11),
        ]
    );
    assert_interval_invariants(&p);
}

#[test]
fn format_extends_touching_same_type() {
    let mut p = paragraph("abcdefgh").with_formats(vec![Format::new(FormatType::Strong, 0, 3)]);

    p.format(Format::new(FormatType::Strong, 3, 6), false).unwrap();

    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 0, 6)]);
}

#[test]
fn format_trims_shared_edge() {
    let mut p = paragraph("abcdefgh").with_formats(vec![Format::new(FormatType::Strong, 0, 6)]);
    p.format(Format::new(FormatType::Strong, 3, 6), false).unwrap();
    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 0, 3)]);

    let mut p = paragraph("abcdefgh").with_formats(vec![Format::new(FormatType::Strong, 0, 6)]);
    p.format(Format::new(FormatType::Strong, 0, 2), false).unwrap();
    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 2, 6)]);
}

#[test]
fn format_strictly_inside_splits_in_two() {
    let mut p = paragraph("0123456789").with_formats(vec![Format::new(FormatType::Strong, 0, 10)]);

    p.format(Format::new(FormatType::Strong, 3, 5), false).unwrap();

    assert_eq!(
        p.formats(),
        &[
            Format::new(FormatType::Strong, 0, 3),
            Format::new(FormatType::Strong, 5, 10),
        ]
    );
}

#[test]
fn format_with_attrs_updates_exact_match() {
    let mut p = paragraph("Hello world").with_formats(vec![Format::link(0, 5, "https://a.example")]);

    p.format(Format::link(0, 5, "https://b.example"), false).unwrap();

    assert_eq!(p.formats(), &[Format::link(0, 5, "https://b.example")]);
}

#[test]
fn adjacent_links_with_different_targets_stay_apart() {
    let mut p = paragraph("foobar").with_formats(vec![Format::link(0, 3, "https://a.example")]);

    p.format(Format::link(3, 6, "https://b.example"), false).unwrap();

    assert_eq!(
        p.formats(),
        &[
            Format::link(0, 3, "https://a.example"),
            Format::link(3, 6, "https://b.example"),
        ]
    );
}

#[test]
fn adjacent_links_with_same_target_join() {
    let mut p = paragraph("foobar").with_formats(vec![Format::link(0, 3, "https://a.example")]);

    p.format(Format::link(3, 6, "https://a.example"), false).unwrap();

    assert_eq!(p.formats(), &[Format::link(0, 6, "https://a.example")]);
}

#[test]
fn removing_text_between_links_keeps_both() {
    let mut p = paragraph("ab-cd").with_formats(vec![
        Format::link(0, 2, "https://a.example"),
        Format::link(3, 5, "https://b.example"),
    ]);

    p.remove_characters_at(2, 1).unwrap();

    assert_eq!(
        p.formats(),
        &[
            Format::link(0, 2, "https://a.example"),
            Format::link(2, 4, "https://b.example"),
        ]
    );
}

#[test]
fn clear_removes_only_the_span() {
    let mut p = paragraph("abcdefgh").with_formats(vec![
        Format::new(FormatType::Strong, 0, 6),
        Format::new(FormatType::Underline, 6, 8),
    ]);

    p.format(Format::new(FormatType::Strong, 2, 4), true).unwrap();

    assert_eq!(
        p.formats(),
        &[
            Format::new(FormatType::Strong, 0, 2),
            Format::new(FormatType::Strong, 4, 6),
            Format::new(FormatType::Underline, 6, 8),
        ]
    );
}

#[test]
fn format_out_of_range_is_rejected() {
    let mut p = paragraph("short");
    assert!(p.format(Format::new(FormatType::Code, 2, 20), false).is_err());
    assert!(p.formats().is_empty());
}

#[test]
fn remove_characters_drops_contained_format() {
    let mut p = paragraph("Hello world").with_formats(vec![Format::new(FormatType::Strong, 2, 4)]);

    let removed = p.remove_characters_at(1, 3).unwrap();

    assert_eq!(removed, "ell");
    assert_eq!(p.text(), "Ho world");
    assert!(p.formats().is_empty());
}

#[test]
fn remove_characters_rejects_overflowing_range() {
    let mut p = paragraph("Hello").with_formats(vec![Format::new(FormatType::Strong, 0, 5)]);

    assert!(p.remove_characters_at(usize::MAX, 2).is_err());
    assert!(p.remove_characters_at(2, usize::MAX).is_err());
    assert!(p.remove_characters_at(3, 3).is_err());

    assert_eq!(p.text(), "Hello");
    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 0, 5)]);
}

#[test]
fn remove_characters_shrinks_and_shifts() {
    let mut p = paragraph("Hello world").with_formats(vec![
        Format::new(FormatType::Strong, 0, 5),
        Format::new(FormatType::Emphasis, 6, 11),
    ]);

    p.remove_characters_at(3, 4).unwrap();

    assert_eq!(p.text(), "Helorld");
    assert_eq!(
        p.formats(),
        &[
            Format::new(FormatType::Strong, 0, 3),
            Format::new(FormatType::Emphasis, 3, 7),
        ]
    );
}

#[test]
fn insert_characters_shifts_following_formats() {
    let mut p = paragraph("Hello world").with_formats(vec![
        Format::new(FormatType::Strong, 0, 2),
        Format::new(FormatType::Emphasis, 6, 11),
    ]);

    p.insert_characters_at("big ", 6).unwrap();

    assert_eq!(p.text(), "Hello big world");
    assert_eq!(
        p.formats(),
        &[
            Format::new(FormatType::Strong, 0, 2),
            Format::new(FormatType::Emphasis, 10, 15),
        ]
    );
}

#[test]
fn insert_inside_format_grows_it() {
    let mut p = paragraph("abcd").with_formats(vec![Format::new(FormatType::Code, 1, 3)]);

    p.insert_characters_at("xy", 2).unwrap();

    assert_eq!(p.text(), "abxycd");
    assert_eq!(p.formats(), &[Format::new(FormatType::Code, 1, 5)]);
}

#[test]
fn offsets_count_characters_not_bytes() {
    let mut p = paragraph("héllo").with_formats(vec![Format::new(FormatType::Strong, 1, 3)]);

    p.insert_characters_at("ü", 1).unwrap();

    assert_eq!(p.text(), "hüéllo");
    assert_eq!(p.len(), 6);
    assert_eq!(p.formats(), &[Format::new(FormatType::Strong, 2, 4)]);
}

#[test]
fn rendering_markers_are_stripped_from_text() {
    let mut p = paragraph("a\u{00A0}b");
    p.insert_characters_at("\u{200B}", 0).unwrap();
    assert_eq!(p.text(), "a b");
}

#[test]
fn interval_invariants_hold_across_edits() {
    let mut p = paragraph("The quick brown fox jumps over the lazy dog");
    let steps: [(FormatType, usize, usize, bool); 8] = [
        (FormatType::Strong, 0, 9, false),
        (FormatType::Emphasis, 4, 15, false),
        (FormatType::Strong, 9, 12, false),
        (FormatType::Underline, 0, 43, false),
        (FormatType::Strong, 2, 5, true),
        (FormatType::Emphasis, 10, 20, false),
        (FormatType::Code, 16, 19, false),
        (FormatType::Underline, 20, 25, true),
    ];
    for (kind, from, to, clear) in steps {
        p.format(Format::new(kind, from, to), clear).unwrap();
        assert_interval_invariants(&p);
    }

    p.remove_characters_at(3, 10).unwrap();
    assert_interval_invariants(&p);
    p.insert_characters_at("!!", 0).unwrap();
    assert_interval_invariants(&p);
}

#[test]
fn formatted_ranges_report_mixed_types() {
    let p = paragraph("Hello world").with_formats(vec![
        Format::new(FormatType::Strong, 0, 5),
        Format::new(FormatType::Emphasis, 6, 11),
    ]);

    assert_eq!(
        p.get_formatted_ranges(&Format::new(FormatType::Strong, 5, 6), true),
        Some(vec![0])
    );
    assert_eq!(
        p.get_formatted_ranges(&Format::new(FormatType::Strong, 4, 8), true),
        None
    );
    assert_eq!(
        p.get_formatted_ranges(&Format::new(FormatType::Strong, 4, 8), false),
        Some(vec![0, 1])
    );
    assert_eq!(
        p.get_formatted_ranges(&Format::new(FormatType::Code, 5, 6), true),
        Some(vec![])
    );
}
