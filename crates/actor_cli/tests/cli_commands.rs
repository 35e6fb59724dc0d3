use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use actor_core::actor::{ActorPack, derived_flags, pack_path};
use actor_core::actor_info::ActorInfoIndex;
use actor_core::archive::{Archive, MemoryArchive};
use actor_core::byml::{self, Byml};
use actor_core::core_api::{ACTOR_INFO_PATH, GAMEDATA_DIR, SAVEDATA_DIR};
use actor_core::flag::FlagKind;
use actor_core::hash_of;
use actor_core::overrides::OverrideRuleSet;
use actor_core::pages::{
    GAMEDATA_EXT, SAVEDATA_EXT, load_gamedata, replace_pages, write_gamedata, write_savedata,
};
use actor_core::reader::Endian;
use actor_core::store::FlagStore;
use serde_json::Value;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn rules_path() -> String {
    workspace_root()
        .join("data/overrides.json")
        .to_string_lossy()
        .to_string()
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_botw-actor"))
        .args(args)
        .output()
        .expect("failed to run botw-actor CLI")
}

fn temp_mod_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{}", std::process::id(), nanos))
}

/// Lay out a mod directory holding one sword actor and its flags.
fn write_fixture(dir: &Path, with_save_tail: bool) {
    let rules = OverrideRuleSet::from_path(&workspace_root().join("data/overrides.json"))
        .expect("rule table should load");
    let mut archive = MemoryArchive::new();

    let mut pack = ActorPack::new("Weapon_Sword_001");
    pack.set_link("ModelUser", "Weapon_Sword_001").expect("link");
    pack.set_link_data("ModelUser", b"model-list".to_vec());
    pack.set_link("ProfileUser", "WeaponSmallSword").expect("link");
    let path = pack_path(pack.name(), false);
    for (inner, data) in pack.to_files(Endian::Little).expect("pack should encode") {
        archive.set(&format!("{path}//{inner}"), data);
    }

    let mut index = ActorInfoIndex::new();
    let mut record = Byml::new_hash();
    record.insert("sortKey", 7_i32);
    index
        .insert_or_replace("Weapon_Sword_001", record)
        .expect("record");
    archive.set(
        ACTOR_INFO_PATH,
        byml::to_binary(&index.to_document(), Endian::Little).expect("index should encode"),
    );

    let mut flags = FlagStore::new();
    for flag in derived_flags("Weapon_Sword_001", &rules) {
        flags.add(flag);
    }
    let gamedata = write_gamedata(&flags, Endian::Little).expect("pages should encode");
    replace_pages(&mut archive, GAMEDATA_DIR, GAMEDATA_EXT, &gamedata);
    if with_save_tail {
        let tail = [b"tail-a".to_vec(), b"tail-b".to_vec()];
        let savedata = write_savedata(&flags, Endian::Little, &tail).expect("pages should encode");
        replace_pages(&mut archive, SAVEDATA_DIR, SAVEDATA_EXT, &savedata);
    }
    archive.write_dir(dir).expect("fixture should write");
}

fn map_doc(path: &Path, objects: &[(&str, u32)]) {
    let objs = objects
        .iter()
        .map(|(name, id)| {
            let mut obj = Byml::new_hash();
            obj.insert("UnitConfigName", *name);
            obj.insert("HashId", *id);
            obj
        })
        .collect();
    let mut doc = Byml::new_hash();
    doc.insert("Objs", Byml::Array(objs));
    fs::write(path, byml::to_binary(&doc, Endian::Little).expect("map should encode"))
        .expect("map should write");
}

#[test]
fn cli_lists_flags_by_substring() {
    let dir = temp_mod_dir("botw_actor_flags");
    write_fixture(&dir, true);
    let dir_str = dir.to_string_lossy().to_string();

    let output = run_cli(&["flags", &dir_str, "Sword_001", "--category", "s32_data"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("EquipTime_Weapon_Sword_001"));
    assert!(!stdout.contains("IsGet_Weapon_Sword_001"));
    assert_eq!(stdout.lines().last(), Some("3 flags"));

    let output = run_cli(&["flags", &dir_str, "IsGet_", "--json"]);
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value[0]["name"], "IsGet_Weapon_Sword_001");
    assert_eq!(value[0]["hash"], hash_of("IsGet_Weapon_Sword_001"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_rejects_unknown_category() {
    let output = run_cli(&["flags", "somewhere", "x", "--category", "s33_data"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_rename_rewrites_the_mod_directory() {
    let dir = temp_mod_dir("botw_actor_rename");
    write_fixture(&dir, true);
    let dir_str = dir.to_string_lossy().to_string();
    let rules = rules_path();

    let output = run_cli(&[
        "rename",
        &dir_str,
        "Weapon_Sword_001",
        "Weapon_Sword_002",
        "--rules",
        &rules,
        "--json",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["totals"]["new"], 6);
    assert_eq!(report["totals"]["deleted"], 6);
    assert_eq!(report["actors"][0], "Weapon_Sword_002");

    assert!(
        dir.join("Actor/Pack/Weapon_Sword_002.sbactorpack/Actor/ModelList/Weapon_Sword_002.bmodellist")
            .is_file()
    );
    assert_eq!(
        fs::read(dir.join("GameData/savedataformat/saveformat_1.bgsvdata")).expect("tail page"),
        b"tail-a"
    );

    let archive = MemoryArchive::load_dir(&dir).expect("directory should load");
    let flags = load_gamedata(&archive, GAMEDATA_DIR).expect("pages should load");
    assert!(flags.find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_002")).is_some());
    assert!(flags.find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_001")).is_none());
    let index = byml::from_binary(archive.get(ACTOR_INFO_PATH).expect("index")).expect("decodes");
    let index = ActorInfoIndex::from_document(&index).expect("aligned");
    assert_eq!(
        index.get("Weapon_Sword_002").and_then(|r| r.get("sortKey")),
        Some(&Byml::Int(8))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_rename_uses_built_in_rules_by_default() {
    let dir = temp_mod_dir("botw_actor_default_rules");
    write_fixture(&dir, true);
    let dir_str = dir.to_string_lossy().to_string();

    let output = run_cli(&[
        "rename",
        &dir_str,
        "Weapon_Sword_001",
        "Weapon_Sword_002",
        "--json",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["save_data"]["new"], 6);
    assert_eq!(report["save_data"]["deleted"], 6);

    let archive = MemoryArchive::load_dir(&dir).expect("directory should load");
    let flags = load_gamedata(&archive, GAMEDATA_DIR).expect("pages should load");
    let acquired = flags
        .find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_002"))
        .expect("renamed flag");
    assert!(acquired.is_persistent());
    assert!(acquired.header().is_one_shot);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_rename_without_save_tail_fails_and_writes_nothing() {
    let dir = temp_mod_dir("botw_actor_no_tail");
    write_fixture(&dir, false);
    let dir_str = dir.to_string_lossy().to_string();

    let output = run_cli(&["rename", &dir_str, "Weapon_Sword_001", "Weapon_Sword_002"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error staging changes"));
    assert!(!dir.join("Actor/Pack/Weapon_Sword_002.sbactorpack").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_copy_prints_text_report() {
    let dir = temp_mod_dir("botw_actor_copy");
    write_fixture(&dir, true);
    let dir_str = dir.to_string_lossy().to_string();
    let rules = rules_path();

    let output = run_cli(&[
        "copy",
        &dir_str,
        "Weapon_Sword_001",
        "Weapon_Sword_900",
        "--force",
        "ModelUser",
        "--rules",
        &rules,
        "--verbose",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Actor: Weapon_Sword_900"));
    assert!(stdout.contains("3 flags were added to bool_data"));
    assert!(stdout.contains("3 flags were added to s32_data"));
    assert!(dir.join("Actor/Pack/Weapon_Sword_001.sbactorpack").is_dir());
    assert!(dir.join("Actor/Pack/Weapon_Sword_900.sbactorpack").is_dir());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_revival_adds_map_object_flags() {
    let dir = temp_mod_dir("botw_actor_revival");
    write_fixture(&dir, true);
    let map = dir.with_extension("map.byml");
    map_doc(&map, &[("Obj_TreeApple_A_01", 1001), ("AreaObj", 1002)]);
    let dir_str = dir.to_string_lossy().to_string();
    let map_str = map.to_string_lossy().to_string();

    let output = run_cli(&["revival", &dir_str, &map_str, "--json"]);
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["categories"]["bool_data"]["new"], 1);
    assert!(dir.join("GameData/gamedata/revival_bool_data_0.bgdata").is_file());

    let _ = fs::remove_dir_all(&dir);
    let _ = fs::remove_file(&map);
}
