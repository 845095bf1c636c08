use ai_llm_service::ChatMessage;
use game_store::{
    ANONYMOUS_USER, NewCustomContent, NewModificationLog, NewProject, SaveRequest, Store,
    StoreError,
};
use novel_analysis::{AnalysisRepository, AnalysisStatus, ProjectState};
use serde_json::json;

fn project(store: &Store, name: &str) -> i64 {
    store
        .create_project(&NewProject {
            name: name.into(),
            description: "测试".into(),
            novel_path: "data/novels/a.txt".into(),
            chapter_mode: false,
        })
        .unwrap()
}

fn save(slot: i64, chapter: &str) -> SaveRequest {
    serde_json::from_value(json!({ "slot": slot, "current_chapter": chapter })).unwrap()
}

#[test]
fn project_state_round_trips() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "斗破");

    let fresh = store.get_project(id).unwrap();
    assert_eq!(fresh.name, "斗破");
    assert_eq!(fresh.state.analysis_status, AnalysisStatus::Pending);
    assert!(fresh.state.characters.is_empty());

    let mut state = ProjectState::new();
    state.world_setting.insert("力量体系".into(), json!(["斗之气"]));
    state.total_chunks = 40;
    state.analysis_progress = 12;
    state.analysis_status = AnalysisStatus::Paused;
    store.save_project(id, &state).unwrap();

    let loaded = store.get_project(id).unwrap();
    assert_eq!(loaded.state, state);

    let listed = store.list_projects().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].analysis_progress, 12);
    assert_eq!(listed[0].analysis_status, AnalysisStatus::Paused);
}

#[test]
fn missing_project_is_not_found() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.find_project(7).unwrap().is_none());
    assert!(matches!(
        store.save_project_state(7, &ProjectState::new()),
        Err(StoreError::NotFound { entity: "project", .. })
    ));
}

#[test]
fn analysis_cache_is_write_once_and_ordered() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "a");
    store.store_result(id, 1, "二", &json!({ "n": 1 })).unwrap();
    store.store_result(id, 0, "一", &json!({ "n": 0 })).unwrap();
    store.store_result(id, 0, "一", &json!({ "n": "again" })).unwrap();

    assert_eq!(store.cached_result(id, 0).unwrap(), Some(json!({ "n": 0 })));
    assert_eq!(store.cached_result(id, 5).unwrap(), None);
    assert_eq!(
        store.cached_results(id, u64::MAX).unwrap(),
        vec![(0, json!({ "n": 0 })), (1, json!({ "n": 1 }))]
    );
    assert_eq!(store.cached_results(id, 1).unwrap().len(), 1);
    assert_eq!(store.cached_chunk_count(id).unwrap(), 2);
}

#[test]
fn saves_upsert_per_user_and_slot() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "a");

    let first = store.save_game(id, ANONYMOUS_USER, &save(1, "ch_001")).unwrap();
    let again = store.save_game(id, ANONYMOUS_USER, &save(1, "ch_002")).unwrap();
    assert_eq!(first, again);
    store.save_game(id, "alice", &save(1, "ch_009")).unwrap();

    let loaded = store.load_game(id, ANONYMOUS_USER, 1).unwrap().unwrap();
    assert_eq!(loaded.current_chapter, "ch_002");
    assert_eq!(loaded.save_name, "存档 1");
    assert_eq!(loaded.inventory, json!([]));
    assert_eq!(loaded.attributes, json!({}));

    assert_eq!(store.list_saves(id, "alice").unwrap()[0].current_chapter, "ch_009");
    assert!(store.delete_save(id, ANONYMOUS_USER, 1).unwrap());
    assert!(!store.delete_save(id, ANONYMOUS_USER, 1).unwrap());
    assert!(store.load_game(id, ANONYMOUS_USER, 1).unwrap().is_none());
    assert_eq!(store.list_saves(id, "alice").unwrap().len(), 1);
}

#[test]
fn sessions_keep_history_without_credentials() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "a");
    let sid = store.create_session(id, "deepseek").unwrap();

    let session = store.find_session(sid).unwrap().unwrap();
    assert_eq!(session.provider, "deepseek");
    assert!(session.history.is_empty());

    let history = vec![ChatMessage::user("加个角色"), ChatMessage::assistant("好的")];
    store.update_session_history(sid, &history).unwrap();
    assert_eq!(store.find_session(sid).unwrap().unwrap().history, history);
    assert!(store.find_session(sid + 1).unwrap().is_none());
}

#[test]
fn modification_logs_are_newest_first() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "a");
    let mut state = ProjectState::new();

    for i in 0..3 {
        state.world_setting.insert("势力".into(), json!([i]));
        store
            .apply_modification(
                id,
                &state,
                &NewModificationLog {
                    session_id: None,
                    operation_type: "update".into(),
                    target_path: "world_setting.势力".into(),
                    old_value: json!(null),
                    new_value: json!([i]),
                    description: format!("第{i}次"),
                },
            )
            .unwrap();
    }

    let logs = store.list_logs(id, 2).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].description, "第2次");
    assert_eq!(logs[1].new_value, json!([1]));
    assert_eq!(
        store.get_project(id).unwrap().state.world_setting["势力"],
        json!([2])
    );
    assert!(store.find_log(id, logs[0].id).unwrap().is_some());
    assert!(store.find_log(id + 1, logs[0].id).unwrap().is_none());
}

fn custom(content_type: &str, content_id: &str, data: serde_json::Value) -> NewCustomContent {
    NewCustomContent {
        content_type: content_type.into(),
        content_id: content_id.into(),
        content_data: data,
        is_active: true,
    }
}

#[test]
fn custom_content_upserts_by_type_and_id() {
    let store = Store::open_in_memory().unwrap();
    let id = project(&store, "斗破");
    let other = project(&store, "凡人");

    let (first, created) = store
        .save_custom_content(id, &custom("quest", "q_001", json!({ "名称": "寻找异火" })))
        .unwrap();
    assert!(created);
    let (item, _) = store
        .save_custom_content(id, &custom("item", "q_001", json!({ "名称": "纳戒" })))
        .unwrap();
    assert_ne!(item, first);
    store
        .save_custom_content(other, &custom("quest", "q_001", json!({})))
        .unwrap();

    let mut update = custom("quest", "q_001", json!({ "名称": "收服青莲地心火" }));
    update.is_active = false;
    let (again, created) = store.save_custom_content(id, &update).unwrap();
    assert_eq!(again, first);
    assert!(!created);

    let all = store.list_custom_content(id, None).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].content_data, json!({ "名称": "收服青莲地心火" }));
    assert!(!all[0].is_active);

    let quests = store.list_custom_content(id, Some("quest")).unwrap();
    assert_eq!(quests.len(), 1);
    assert_eq!(quests[0].content_id, "q_001");
    assert!(store.list_custom_content(id, Some("scene")).unwrap().is_empty());
}

#[test]
fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("game.db");
    let id = {
        let store = Store::open(&path).unwrap();
        project(&store, "持久")
    };
    let store = Store::open(&path).unwrap();
    assert_eq!(store.get_project(id).unwrap().name, "持久");
}
