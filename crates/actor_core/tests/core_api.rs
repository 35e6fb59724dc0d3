use std::collections::BTreeSet;
use std::path::PathBuf;

use actor_core::actor::{ActorPack, DUMMY, derived_flags, pack_path};
use actor_core::actor_info::ActorInfoIndex;
use actor_core::archive::{Archive, MemoryArchive};
use actor_core::byml::{self, Byml};
use actor_core::copy::MapResolver;
use actor_core::core_api::{
    ACTOR_INFO_PATH, CoreErrorCode, Engine, GAMEDATA_DIR, SAVEDATA_DIR, Session,
};
use actor_core::flag::{Flag, FlagKind};
use actor_core::hash_of;
use actor_core::overrides::OverrideRuleSet;
use actor_core::pages::{
    GAMEDATA_EXT, SAVEDATA_EXT, replace_pages, write_gamedata, write_savedata,
};
use actor_core::reader::Endian;
use actor_core::store::{ChangeCounts, FlagStore};

const SWORD: &str = "Weapon_Sword_001";
const RENAMED: &str = "Weapon_Sword_002";

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn standard_rules() -> OverrideRuleSet {
    let path = workspace_root().join("data/overrides.json");
    OverrideRuleSet::from_path(&path).unwrap_or_else(|e| panic!("failed to load {:?}: {}", path, e))
}

fn put_pack(archive: &mut MemoryArchive, pack: &ActorPack) {
    let path = pack_path(pack.name(), false);
    for (inner, data) in pack.to_files(Endian::Little).expect("pack should encode") {
        archive.set(&format!("{path}//{inner}"), data);
    }
}

/// A mod directory with one sword actor, an apple, its flags and a save tail.
fn sword_archive(rules: &OverrideRuleSet) -> MemoryArchive {
    let mut archive = MemoryArchive::new();

    let mut pack = ActorPack::new(SWORD);
    pack.set_link("ModelUser", SWORD).expect("link");
    pack.set_link_data("ModelUser", b"model-list".to_vec());
    pack.set_link("ProfileUser", "WeaponSmallSword").expect("link");
    pack.set_link("LifeConditionUser", "Weapon_Sword").expect("link");
    pack.set_misc_file("Actor/Physics/Weapon_Sword_Common.bphysics", b"physics".to_vec());
    put_pack(&mut archive, &pack);

    let mut index = ActorInfoIndex::new();
    let mut record = Byml::new_hash();
    record.insert("sortKey", 40_i32);
    record.insert("profile", "WeaponSmallSword");
    record.insert("bfres", "WeaponSword_001");
    record.insert("mainModel", SWORD);
    index.insert_or_replace(SWORD, record).expect("record");
    let mut apple = Byml::new_hash();
    apple.insert("profile", "Item");
    index.insert_or_replace("Item_Apple", apple).expect("record");
    archive.set(
        ACTOR_INFO_PATH,
        byml::to_binary(&index.to_document(), Endian::Little).expect("index should encode"),
    );

    let mut flags = FlagStore::new();
    for flag in derived_flags(SWORD, rules) {
        flags.add(flag);
    }
    let mut cleared = Flag::new(FlagKind::Bool, "Clear_Dungeon000");
    cleared.header_mut().is_persistent = true;
    flags.add(cleared);
    let gamedata = write_gamedata(&flags, Endian::Little).expect("pages should encode");
    replace_pages(&mut archive, GAMEDATA_DIR, GAMEDATA_EXT, &gamedata);
    let tail = [b"tail-a".to_vec(), b"tail-b".to_vec()];
    let savedata = write_savedata(&flags, Endian::Little, &tail).expect("pages should encode");
    replace_pages(&mut archive, SAVEDATA_DIR, SAVEDATA_EXT, &savedata);
    archive
}

fn open_sword() -> Session {
    let rules = standard_rules();
    let archive = sword_archive(&rules);
    Engine::with_rules(rules)
        .open(archive)
        .expect("fixture should open")
}

fn reloaded_index(archive: &MemoryArchive) -> ActorInfoIndex {
    let bytes = archive.get(ACTOR_INFO_PATH).expect("index present");
    ActorInfoIndex::from_document(&byml::from_binary(bytes).expect("index decodes"))
        .expect("index stays aligned")
}

#[test]
fn engine_reads_index_and_pages() {
    let session = open_sword();
    assert_eq!(session.endian(), Endian::Little);
    assert_eq!(session.actor_index().len(), 2);
    assert_eq!(session.flags().total_len(), 7);

    let found = session.search_flags("Weapon_Sword_001", Some(FlagKind::S32));
    let names: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"EquipTime_Weapon_Sword_001"));
    assert!(found.iter().all(|f| f.persistent));
}

#[test]
fn engine_requires_an_actor_index() {
    let err = Engine::new()
        .open(MemoryArchive::new())
        .expect_err("an empty archive has no index");
    assert_eq!(err.code, CoreErrorCode::NotFound);
}

#[test]
fn rename_moves_links_flags_and_index_entry() {
    let mut session = open_sword();
    session.rename_actor(SWORD, RENAMED).expect("rename should succeed");

    let actor = session.actor(RENAMED).expect("renamed actor is open");
    assert_eq!(actor.link("ModelUser"), RENAMED);
    assert_eq!(actor.link("PhysicsUser"), DUMMY);
    assert_eq!(actor.link("ProfileUser"), "WeaponSmallSword");
    assert_eq!(actor.link("LifeConditionUser"), "Weapon_Sword");
    assert_eq!(actor.flags().total_len(), 6);
    assert!(!actor.is_renaming());

    let report = session.save().expect("save should succeed");
    assert_eq!(report.actors, vec![RENAMED.to_string()]);
    let swapped = ChangeCounts {
        new: 3,
        modified: 0,
        deleted: 3,
    };
    let by_kind: Vec<(FlagKind, ChangeCounts)> = report
        .categories
        .iter()
        .map(|c| (c.category, c.counts))
        .collect();
    assert_eq!(by_kind, vec![(FlagKind::Bool, swapped), (FlagKind::S32, swapped)]);
    assert_eq!(
        report.save_data,
        ChangeCounts {
            new: 6,
            modified: 0,
            deleted: 6
        }
    );
    assert_eq!(report.gamedata_pages, 2);
    assert_eq!(report.savedata_pages, 3);

    let archive = session.archive();
    let new_pack = pack_path(RENAMED, false);
    assert_eq!(
        archive.get(&format!("{new_pack}//Actor/ModelList/{RENAMED}.bmodellist")),
        Some(&b"model-list"[..])
    );
    assert!(archive.contains(&format!("{new_pack}//Actor/ActorLink/{RENAMED}.bxml")));
    assert_eq!(
        archive.get(&format!("{SAVEDATA_DIR}/saveformat_1.bgsvdata")),
        Some(&b"tail-a"[..])
    );
    assert_eq!(
        archive.get(&format!("{SAVEDATA_DIR}/saveformat_2.bgsvdata")),
        Some(&b"tail-b"[..])
    );

    let index = reloaded_index(archive);
    let record = index.get(RENAMED).expect("new entry");
    assert_eq!(record.get("sortKey"), Some(&Byml::Int(41)));
    assert_eq!(record.get("profile").and_then(Byml::as_str), Some("WeaponSmallSword"));
    assert_eq!(record.get("isHasFar"), Some(&Byml::Bool(false)));
    assert!(index.contains(SWORD));
}

#[test]
fn renamed_flags_replace_the_old_ones_on_reload() {
    let mut session = open_sword();
    session.rename_actor(SWORD, RENAMED).expect("rename should succeed");
    session.save().expect("save should succeed");

    let reopened = Engine::with_rules(standard_rules())
        .open(session.into_archive())
        .expect("saved archive should open");
    let flags = reopened.flags();
    assert!(flags.find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_001")).is_none());
    let is_get = flags
        .find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_002"))
        .expect("new acquisition flag");
    assert!(is_get.is_persistent());
    assert!(is_get.header().is_one_shot);
    assert!(flags.find(FlagKind::Bool, hash_of("Clear_Dungeon000")).is_some());
    assert_eq!(flags.total_len(), 7);
}

#[test]
fn far_variant_keeps_a_life_condition() {
    let mut session = open_sword();
    assert!(session.set_actor_has_far(SWORD, true).expect("far toggles"));
    assert!(!session.set_actor_has_far(SWORD, true).expect("far already on"));

    let err = session
        .set_actor_link(SWORD, "LifeConditionUser", DUMMY)
        .expect_err("far actors need a life condition");
    assert_eq!(err.code, CoreErrorCode::Constraint);
    let actor = session.actor(SWORD).expect("open actor");
    assert_eq!(actor.link("LifeConditionUser"), "Weapon_Sword");

    session
        .set_actor_link(SWORD, "ModelUser", "Weapon_Sword_Shared")
        .expect("model link");
    let far = session
        .actor(SWORD)
        .and_then(|a| a.far())
        .expect("far pack");
    assert_eq!(far.link("ModelUser"), "Weapon_Sword_Shared");

    session.save().expect("save should succeed");
    let index = reloaded_index(session.archive());
    assert_eq!(index.get(SWORD).and_then(|r| r.get("isHasFar")), Some(&Byml::Bool(true)));
    assert!(index.contains("Weapon_Sword_001_Far"));
    assert!(
        session
            .archive()
            .contains("Actor/Pack/Weapon_Sword_001_Far.sbactorpack//Actor/ActorLink/Weapon_Sword_001_Far.bxml")
    );
}

#[test]
fn rename_carries_the_far_variant_along() {
    let mut session = open_sword();
    session.set_actor_has_far(SWORD, true).expect("far toggles");
    session.rename_actor(SWORD, RENAMED).expect("rename should succeed");

    let far = session
        .actor(RENAMED)
        .and_then(|a| a.far())
        .expect("far pack follows the rename");
    assert_eq!(far.name(), "Weapon_Sword_002_Far");
    assert_eq!(far.link("ModelUser"), RENAMED);
    assert_eq!(far.link("LifeConditionUser"), DUMMY);

    session.save().expect("save should succeed");
    let archive = session.archive();
    assert!(archive.contains(
        "Actor/Pack/Weapon_Sword_002_Far.sbactorpack//Actor/ActorLink/Weapon_Sword_002_Far.bxml"
    ));
    let index = reloaded_index(archive);
    assert!(index.contains("Weapon_Sword_002_Far"));
    assert_eq!(
        index.get(RENAMED).and_then(|r| r.get("isHasFar")),
        Some(&Byml::Bool(true))
    );
}

#[test]
fn unknown_link_kind_is_a_constraint_error() {
    let mut session = open_sword();
    let err = session
        .set_actor_link(SWORD, "NotALink", "x")
        .expect_err("unknown link");
    assert_eq!(err.code, CoreErrorCode::Constraint);
}

#[test]
fn copy_brings_forced_links_along() {
    let mut session = open_sword();
    let mut resolver = MapResolver::new();
    resolver.insert(SWORD, "PhysicsUser", "Weapon_Sword_Common");
    let force = BTreeSet::from(["ModelUser".to_string(), "PhysicsUser".to_string()]);

    session
        .copy_actor(SWORD, "Weapon_Sword_777", &force, &resolver, Some("WeaponSword_777"))
        .expect("copy should succeed");
    let report = session.save().expect("save should succeed");
    assert_eq!(report.totals().new, 6);
    assert_eq!(report.totals().deleted, 0);

    let archive = session.archive();
    let pack = pack_path("Weapon_Sword_777", false);
    assert_eq!(
        archive.get(&format!("{pack}//Actor/Physics/Weapon_Sword_777.bphysics")),
        Some(&b"physics"[..])
    );
    assert_eq!(
        archive.get(&format!("{pack}//Actor/ModelList/Weapon_Sword_777.bmodellist")),
        Some(&b"model-list"[..])
    );
    assert!(archive.contains(&format!("{}//Actor/ActorLink/{SWORD}.bxml", pack_path(SWORD, false))));

    let index = reloaded_index(archive);
    let record = index.get("Weapon_Sword_777").expect("copied entry");
    assert_eq!(record.get("bfres").and_then(Byml::as_str), Some("WeaponSword_777"));
    assert_eq!(record.get("mainModel").and_then(Byml::as_str), Some("Weapon_Sword_777"));
    assert_eq!(record.get("sortKey"), Some(&Byml::Int(41)));
    assert_eq!(index.get(SWORD).and_then(|r| r.get("sortKey")), Some(&Byml::Int(40)));
}

#[test]
fn copy_onto_an_existing_actor_is_refused() {
    let mut session = open_sword();
    let err = session
        .copy_actor(SWORD, "Item_Apple", &BTreeSet::new(), &MapResolver::new(), None)
        .expect_err("target exists");
    assert_eq!(err.code, CoreErrorCode::UnsupportedOperation);
}

#[test]
fn failed_staging_leaves_the_archive_untouched() {
    let rules = standard_rules();
    let mut archive = sword_archive(&rules);
    for path in archive.entries_under(SAVEDATA_DIR) {
        archive.remove(&path);
    }
    let mut session = Engine::with_rules(rules)
        .open(archive)
        .expect("game-state pages are enough to open");
    session.rename_actor(SWORD, RENAMED).expect("rename should succeed");

    let before = session.archive().clone();
    let err = session.save().expect_err("no save tail to carry over");
    assert_eq!(err.code, CoreErrorCode::NotFound);
    assert_eq!(session.archive(), &before);
    assert!(session.flags().find(FlagKind::Bool, hash_of("IsGet_Weapon_Sword_001")).is_some());
}

#[test]
fn big_endian_sessions_write_big_endian_pages() {
    let mut session = open_sword();
    session.set_endian(Endian::Big);
    session.rename_actor(SWORD, RENAMED).expect("rename should succeed");
    session.save().expect("save should succeed");

    let page = session
        .archive()
        .get(&format!("{GAMEDATA_DIR}/bool_data_0.bgdata"))
        .expect("bool page");
    assert_eq!(byml::detect_endian(page), Some(Endian::Big));
    let index = session.archive().get(ACTOR_INFO_PATH).expect("index");
    assert_eq!(byml::detect_endian(index), Some(Endian::Big));
}
