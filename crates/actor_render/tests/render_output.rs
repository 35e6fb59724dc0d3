use actor_core::core_api::{CategoryChange, ChangeReport, FlagSummary};
use actor_core::flag::FlagKind;
use actor_core::hash_of;
use actor_core::store::ChangeCounts;
use actor_render::{
    JsonStyle, TextRenderOptions, TextStyle, render_json_flags, render_json_report,
    render_text_flags, render_text_report,
};

fn rename_report() -> ChangeReport {
    ChangeReport {
        categories: vec![
            CategoryChange {
                category: FlagKind::Bool,
                counts: ChangeCounts {
                    new: 4,
                    modified: 0,
                    deleted: 4,
                },
            },
            CategoryChange {
                category: FlagKind::S32,
                counts: ChangeCounts {
                    new: 2,
                    modified: 1,
                    deleted: 0,
                },
            },
        ],
        save_data: ChangeCounts {
            new: 1,
            modified: 0,
            deleted: 0,
        },
        actors: vec!["Weapon_Sword_002".to_string()],
        gamedata_pages: 3,
        savedata_pages: 4,
    }
}

fn summary(name: &str, kind: FlagKind, persistent: bool) -> FlagSummary {
    FlagSummary {
        name: name.to_string(),
        hash: hash_of(name),
        category: kind,
        persistent,
        revival: false,
    }
}

#[test]
fn report_json_uses_canonical_top_level_order() {
    let value = render_json_report(&rename_report(), JsonStyle::CanonicalV1);
    let keys: Vec<&str> = value
        .as_object()
        .expect("json should be an object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        keys,
        vec![
            "totals",
            "categories",
            "save_data",
            "actors",
            "gamedata_pages",
            "savedata_pages"
        ]
    );
}

#[test]
fn report_json_sums_category_counts() {
    let value = render_json_report(&rename_report(), JsonStyle::CanonicalV1);
    assert_eq!(value["totals"]["new"], 6);
    assert_eq!(value["totals"]["modified"], 1);
    assert_eq!(value["totals"]["deleted"], 4);
    assert_eq!(value["categories"]["bool_data"]["deleted"], 4);
    assert_eq!(value["categories"]["s32_data"]["modified"], 1);
    assert_eq!(value["actors"][0], "Weapon_Sword_002");
}

#[test]
fn text_report_summarises_unless_verbose() {
    let report = rename_report();
    let brief = render_text_report(&report, TextStyle::Summary, TextRenderOptions::default());
    assert!(brief.contains("6 flags were added to game data"));
    assert!(brief.contains("1 flag was added to save data"));
    assert!(!brief.contains("bool_data"));

    let verbose = render_text_report(
        &report,
        TextStyle::Summary,
        TextRenderOptions { verbose: true },
    );
    assert!(verbose.contains("4 flags were added to bool_data"));
    assert!(verbose.contains("4 flags were removed from bool_data"));
    assert!(verbose.contains("1 flag was modified in s32_data"));
    assert!(verbose.ends_with("Wrote 3 game data pages and 4 save data pages\n"));
}

#[test]
fn empty_report_says_so() {
    let text = render_text_report(
        &ChangeReport::default(),
        TextStyle::Summary,
        TextRenderOptions::default(),
    );
    assert_eq!(text, "No changes\n");
}

#[test]
fn flag_listing_renders_one_line_per_flag() {
    let flags = vec![
        summary("IsGet_Weapon_Sword_001", FlagKind::Bool, true),
        summary("Weapon_Sword_001_EquipTime", FlagKind::S32, false),
    ];
    let text = render_text_flags(&flags, TextStyle::Summary);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("IsGet_Weapon_Sword_001"));
    assert!(lines[0].ends_with(" save"));
    assert!(lines[1].contains("s32_data"));
    assert_eq!(lines[2], "2 flags");

    let json = render_json_flags(&flags, JsonStyle::CanonicalV1);
    let first = json[0].as_object().expect("flag object");
    let keys: Vec<&str> = first.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["name", "hash", "category", "persistent", "revival"]);
    assert_eq!(json[0]["hash"], hash_of("IsGet_Weapon_Sword_001"));
}
