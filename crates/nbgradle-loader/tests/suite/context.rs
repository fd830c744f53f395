use crate::suite::support::{
    context, fetch, source_roots, wait_until, FakeGradle, RecordingReporter, TIMEOUT,
};
use nbgradle_loader::{GradleProject, ProjectModelChangeListener};
use std::sync::{mpsc, Arc, Mutex};

struct ChannelListener(Mutex<mpsc::Sender<u64>>);

impl ProjectModelChangeListener for ChannelListener {
    fn on_model_changed(&self, project: &Arc<GradleProject>) {
        let _ = self
            .0
            .lock()
            .unwrap()
            .send(project.current_model().state_id());
    }
}

#[test]
fn opened_project_receives_its_loaded_model() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("p");
    std::fs::create_dir_all(&dir).unwrap();
    let gradle = FakeGradle::new("8.5");
    let ctx = context(&gradle, &Arc::new(RecordingReporter::default()));

    let project = ctx.open_project(&dir);
    assert!(Arc::ptr_eq(&project, &ctx.open_project(&dir)));

    wait_until(TIMEOUT, || source_roots(&project.current_model()).is_some());
    assert_eq!(project.current_model().project_dir(), dir.as_path());
    assert_eq!(gradle.connections(), 1);
}

#[test]
fn reloads_by_another_loader_reach_the_open_project() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("p");
    std::fs::create_dir_all(&dir).unwrap();
    let gradle = FakeGradle::new("8.5");
    let ctx = context(&gradle, &Arc::new(RecordingReporter::default()));

    let project = ctx.open_project(&dir);
    wait_until(TIMEOUT, || source_roots(&project.current_model()).is_some());

    let (tx, rx) = mpsc::channel();
    project.add_change_listener(Arc::new(ChannelListener(Mutex::new(tx))));

    let reloaded = fetch(&ctx.create_loader(&dir), false).unwrap();
    let seen_state = rx.recv_timeout(TIMEOUT).unwrap();

    assert!(Arc::ptr_eq(&project.current_model(), &reloaded));
    assert_eq!(seen_state, reloaded.state_id());
}

#[test]
fn closed_projects_are_no_longer_updated() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("p");
    std::fs::create_dir_all(&dir).unwrap();
    let gradle = FakeGradle::new("8.5");
    let ctx = context(&gradle, &Arc::new(RecordingReporter::default()));

    let project = ctx.open_project(&dir);
    wait_until(TIMEOUT, || source_roots(&project.current_model()).is_some());
    let before = project.current_model();

    ctx.close_project(&dir);
    assert!(ctx.open_projects().find(&dir).is_none());
    assert!(project.loader().unwrap().is_shut_down());

    fetch(&ctx.create_loader(&dir), false).unwrap();
    assert!(Arc::ptr_eq(&project.current_model(), &before));
}

#[test]
fn cache_capacity_follows_settings() {
    let gradle = FakeGradle::new("8.5");
    let ctx = context(&gradle, &Arc::new(RecordingReporter::default()));
    assert_eq!(ctx.memory_cache().max_capacity(), 100);

    let mut config = ctx.settings().config();
    config.cache.project_cache_size = 3;
    assert!(ctx.settings().update(config));

    assert_eq!(ctx.memory_cache().max_capacity(), 3);
}

#[test]
fn memory_evicts_oldest_projects_beyond_capacity() {
    let tmp = tempfile::tempdir().unwrap();
    let gradle = FakeGradle::new("8.5");
    let ctx = context(&gradle, &Arc::new(RecordingReporter::default()));
    let mut config = ctx.settings().config();
    config.cache.project_cache_size = 2;
    ctx.settings().update(config);

    let dirs: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            let dir = tmp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            fetch(&ctx.create_loader(&dir), true).unwrap();
            dir
        })
        .collect();

    let memory = ctx.memory_cache();
    assert_eq!(memory.len(), 2);
    assert!(memory.try_get(&dirs[0], None).is_none());
    assert!(memory.try_get(&dirs[1], None).is_some());
    assert!(memory.try_get(&dirs[2], None).is_some());
}
