//! Shared fixtures for phase integration tests.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use teamflow::backup::BackupStore;
use teamflow::core::config::Config;
use teamflow::core::logger::Logger;
use teamflow::core::paths::AppPaths;
use teamflow::errors::ErrorHandler;
use teamflow::gateway::mock::MockGateway;
use teamflow::git::GitAdapter;
use teamflow::notify::Notifier;
use teamflow::phases::PhaseContext;
use teamflow::recovery::RecoveryManager;
use teamflow::ui::{ScriptedAnswer, ScriptedPrompter, Verbosity};

/// Initialize a repository with an identity and an initial commit on
/// `main`.
pub fn init_repo(dir: &Path) {
    let repo = git2::Repository::init(dir).unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@example.com").unwrap();
    }
    repo.set_head("refs/heads/main").unwrap();

    fs::write(dir.join("README.md"), "# test\n").unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new("README.md")).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = repo.signature().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
        .unwrap();
}

/// Add a local bare repository as `origin` and push `main` to it.
pub fn add_bare_origin(dir: &Path, remote_dir: &Path) {
    git2::Repository::init_bare(remote_dir).unwrap();
    let repo = git2::Repository::open(dir).unwrap();
    repo.remote("origin", remote_dir.to_str().unwrap()).unwrap();

    let adapter = GitAdapter::new(dir);
    adapter.push("main", true).unwrap();
}

/// Build a phase context around a scripted prompter and mock gateway.
pub fn context_for(
    dir: &Path,
    gateway: MockGateway,
    answers: Vec<ScriptedAnswer>,
) -> PhaseContext {
    let paths = AppPaths::new(dir);
    let logger = Logger::disabled();
    PhaseContext {
        config: Config::default(),
        logger: logger.clone(),
        paths: paths.clone(),
        prompter: Box::new(ScriptedPrompter::new(answers)),
        git: GitAdapter::new(dir),
        gateway: Arc::new(gateway),
        backup: BackupStore::new(paths.clone()),
        recovery: RecoveryManager::new(paths.clone(), BackupStore::new(paths), logger.clone()),
        errors: Arc::new(ErrorHandler::new(logger.clone())),
        notifier: Notifier::disabled(logger),
        verbosity: Verbosity::Quiet,
    }
}
