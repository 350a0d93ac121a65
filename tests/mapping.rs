use zapd::mapping::{load_mapping_files, MappingRule, MappingStore, MappingTable, MatchKind, MatchTarget};
use zapd::token::Token;

fn rule(kind: MatchKind, value: &str, script: &str) -> MappingRule {
    MappingRule {
        id: String::new(),
        label: String::new(),
        enabled: true,
        kind,
        target: MatchTarget::Text,
        value: value.to_string(),
        script: script.to_string(),
    }
}

#[test]
fn first_match_wins() {
    let table = MappingTable::build(vec![
        rule(MatchKind::Contains, "mario", "**launch.system:nes"),
        rule(MatchKind::Exact, "super mario", "**launch.system:snes"),
    ])
    .unwrap();
    let (script, mapped) = table.resolve(&Token::scanned("1", "Super Mario"));
    assert!(mapped);
    assert_eq!(script, "**launch.system:nes");
}

#[test]
fn no_match_falls_back_to_payload() {
    let table = MappingTable::build(vec![rule(MatchKind::Exact, "zelda", "x")]).unwrap();
    let (script, mapped) = table.resolve(&Token::scanned("04AABB", "**launch.system:nes"));
    assert!(!mapped);
    assert_eq!(script, "**launch.system:nes");
}

#[test]
fn match_kinds_ignore_case() {
    let table = MappingTable::build(vec![
        rule(MatchKind::Exact, "ABC", "exact"),
        rule(MatchKind::Pattern, "*.NES", "pattern"),
    ])
    .unwrap();
    assert_eq!(table.resolve(&Token::scanned("1", "abc")).0, "exact");
    assert_eq!(table.resolve(&Token::scanned("1", "games/mario.nes")).0, "pattern");
    assert!(!table.resolve(&Token::scanned("1", "mario.snes")).1);
}

#[test]
fn disabled_rules_are_skipped() {
    let mut first = rule(MatchKind::Contains, "a", "first");
    first.enabled = false;
    let table = MappingTable::build(vec![first, rule(MatchKind::Contains, "a", "second")]).unwrap();
    assert_eq!(table.resolve(&Token::scanned("1", "a")).0, "second");
}

#[test]
fn uid_target_matches_uid() {
    let mut by_uid = rule(MatchKind::Exact, "04aabb", "by-uid");
    by_uid.target = MatchTarget::Uid;
    let table = MappingTable::build(vec![by_uid]).unwrap();
    assert_eq!(table.resolve(&Token::scanned("04AABB", "other")).0, "by-uid");
    assert!(!table.resolve(&Token::scanned("other", "04AABB")).1);
}

#[test]
fn missing_ids_are_numbered_and_bad_patterns_rejected() {
    let table = MappingTable::build(vec![rule(MatchKind::Exact, "a", "x")]).unwrap();
    assert_eq!(table.find(&Token::scanned("1", "a")).unwrap().id, "mapping-1");

    assert!(MappingTable::build(vec![rule(MatchKind::Pattern, "[", "x")]).is_err());
}

#[test]
fn mapping_files_load_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("b.toml"),
        "[[mapping]]\nmatch = \"contains\"\nvalue = \"a\"\nscript = \"from-b\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("a.toml"),
        "[[mapping]]\nmatch = \"contains\"\nvalue = \"a\"\nscript = \"from-a\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let rules = load_mapping_files(dir.path()).unwrap();
    let scripts: Vec<_> = rules.iter().map(|r| r.script.as_str()).collect();
    assert_eq!(scripts, vec!["from-a", "from-b"]);
}

#[test]
fn missing_folder_has_no_rules() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_mapping_files(&dir.path().join("nope")).unwrap().is_empty());
}

#[test]
fn inline_rules_come_before_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a.toml"),
        "[[mapping]]\nmatch = \"contains\"\nvalue = \"a\"\nscript = \"from-file\"\n",
    )
    .unwrap();
    let store = MappingStore::load(
        vec![rule(MatchKind::Contains, "a", "inline")],
        Some(dir.path().to_owned()),
    )
    .unwrap();
    assert_eq!(store.resolve(&Token::scanned("1", "a")).0, "inline");
    assert_eq!(store.snapshot().len(), 2);
}

#[test]
fn reload_swaps_table_and_keeps_old_one_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = MappingStore::load(Vec::new(), Some(dir.path().to_owned())).unwrap();
    let before = store.snapshot();
    assert!(before.is_empty());

    let file = dir.path().join("m.toml");
    std::fs::write(
        &file,
        "[[mapping]]\nmatch = \"exact\"\nvalue = \"a\"\nscript = \"new\"\n",
    )
    .unwrap();
    assert_eq!(store.reload().unwrap(), 1);
    assert_eq!(store.resolve(&Token::scanned("1", "a")).0, "new");
    // A snapshot taken before the reload is unaffected.
    assert!(before.is_empty());

    std::fs::write(&file, "[[mapping]]\nmatch = \"pattern\"\nvalue = \"[\"\nscript = \"x\"\n").unwrap();
    assert!(store.reload().is_err());
    assert_eq!(store.resolve(&Token::scanned("1", "a")).0, "new");
}
