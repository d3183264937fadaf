//! End-to-end builds against a simulated toolchain.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use buildstack_lib::build::Builder;
use buildstack_lib::deps::{CacheError, CacheOutcome};
use buildstack_lib::events::{BuildEvent, RecordingReporter};
use buildstack_lib::fs::FsError;
use buildstack_lib::{BuildError, BuildSummary};

use super::common::{FakeToolchain, TestStack, UNRESOLVABLE};

async fn build(stack: &TestStack, runner: &FakeToolchain) -> Result<BuildSummary, BuildError> {
  Builder::new(stack.options(), runner.clone()).build().await
}

mod mirroring {
  use super::*;

  #[tokio::test]
  async fn stack_without_manifests_only_mirrors() {
    let stack = TestStack::new();
    stack.write("app1/handler.py", "def handler(): pass");
    stack.write("template.yaml", "Resources: {}");
    let runner = FakeToolchain::new();

    let summary = build(&stack, &runner).await.unwrap();

    assert!(runner.calls().is_empty());
    assert!(summary.manifests.is_empty());
    assert!(summary.runtime.is_none());
    assert!(summary.merged.is_none());
    assert_eq!(summary.mirrored.files(), 2);
    assert!(stack.built("app1/handler.py").is_file());
    assert!(!stack.built(".venv").exists());
    assert!(!stack.built(".pip-overlay").exists());
  }

  #[tokio::test]
  async fn hidden_stack_entries_are_not_mirrored() {
    let stack = TestStack::new();
    stack.write(".git/config", "[core]");
    stack.write("app1/.env", "SECRET=1");

    build(&stack, &FakeToolchain::new()).await.unwrap();

    assert!(!stack.built(".git").exists());
    assert!(stack.built("app1/.env").is_file());
  }

  #[tokio::test]
  async fn files_removed_from_stack_disappear() {
    let stack = TestStack::new();
    stack.write("app1/old.py", "");
    stack.write("app1/handler.py", "");
    build(&stack, &FakeToolchain::new()).await.unwrap();

    fs::remove_file(stack.stack_dir().join("app1/old.py")).unwrap();
    build(&stack, &FakeToolchain::new()).await.unwrap();

    assert!(!stack.built("app1/old.py").exists());
    assert!(stack.built("app1/handler.py").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn mirrored_files_are_hardlinks() {
    use std::os::unix::fs::MetadataExt;

    let stack = TestStack::new();
    stack.write("app1/handler.py", "print('hi')");

    build(&stack, &FakeToolchain::new()).await.unwrap();

    let source = fs::metadata(stack.stack_dir().join("app1/handler.py")).unwrap();
    let mirrored = fs::metadata(stack.built("app1/handler.py")).unwrap();
    assert_eq!(source.ino(), mirrored.ino());
  }

  #[tokio::test]
  async fn missing_stack_is_an_error() {
    let stack = TestStack::new();

    let err = build(&stack, &FakeToolchain::new()).await.unwrap_err();

    assert!(matches!(err, BuildError::Fs(FsError::MissingSource { .. })));
    assert!(!err.is_command_failure());
  }

  #[tokio::test]
  async fn build_inside_stack_is_rejected() {
    let stack = TestStack::new();
    stack.write("app1/handler.py", "");
    let options = buildstack_lib::BuildOptions::new(stack.stack_dir(), stack.stack_dir().join("app1"));

    let err = Builder::new(options, FakeToolchain::new()).build().await.unwrap_err();

    assert!(matches!(err, BuildError::Fs(FsError::OverlappingDirs { .. })));
    assert!(stack.stack_dir().join("app1/handler.py").exists());
  }
}

mod packages {
  use super::*;

  #[tokio::test]
  async fn first_build_installs_and_merges() {
    let stack = TestStack::new();
    stack.write("app1/handler.py", "import requests");
    stack.manifest("app1", &["requests"]);
    let runner = FakeToolchain::new();

    let summary = build(&stack, &runner).await.unwrap();

    assert_eq!(runner.count("virtualenv"), 1);
    assert_eq!(runner.count("compile"), 1);
    assert_eq!(runner.count("install"), 1);
    assert_eq!(runner.count("check"), 1);
    assert_eq!(summary.installed(), 1);
    assert!(summary.runtime.as_ref().unwrap().created);

    assert!(stack.built(".venv").is_dir());
    assert!(stack.built(".pip-overlay/app1/requests/__init__.py").is_file());
    assert!(stack.built(".pip-overlay/app1/requirements.txt").is_file());
    assert!(stack.built("app1/requests/__init__.py").is_file());
    assert_eq!(
      fs::read_to_string(stack.built("app1/requirements.txt")).unwrap(),
      "requests==1.0\n"
    );
  }

  #[tokio::test]
  async fn second_build_runs_no_commands() {
    let stack = TestStack::new();
    stack.write("app1/handler.py", "");
    stack.manifest("app1", &["requests"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();

    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    assert!(runner.calls().is_empty());
    assert_eq!(summary.cached(), 1);
    assert!(!summary.runtime.as_ref().unwrap().created);
    assert!(stack.built("app1/requests/__init__.py").is_file());
    assert!(stack.built("app1/requirements.txt").is_file());
  }

  #[tokio::test]
  async fn touching_one_manifest_rebuilds_only_that_one() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app2", &["boto3"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();

    stack.write("app2/requirements.in", "boto3\nattrs");
    stack.touch("app2/requirements.in", 60);
    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    let resolved = runner.resolved_dirs();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].ends_with("requirements.in"));
    assert!(resolved[0].contains("app2"));
    assert_eq!(summary.installed(), 1);
    assert_eq!(summary.cached(), 1);
    assert!(stack.built("app2/attrs/__init__.py").is_file());
    assert!(stack.built("app1/requests/__init__.py").is_file());
  }

  #[tokio::test]
  async fn stale_package_directory_is_replaced() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests", "six"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();

    stack.write("app1/requirements.in", "requests");
    stack.touch("app1/requirements.in", 60);
    build(&stack, &FakeToolchain::new()).await.unwrap();

    assert!(!stack.built(".pip-overlay/app1/six").exists());
    assert!(stack.built(".pip-overlay/app1/requests").exists());
  }

  #[tokio::test]
  async fn root_manifest_is_processed_first() {
    let stack = TestStack::new();
    stack.manifest("", &["click"]);
    stack.manifest("app1", &["requests"]);
    let runner = FakeToolchain::new();

    let summary = build(&stack, &runner).await.unwrap();

    let order: Vec<&str> = summary.manifests.iter().map(|m| m.manifest.as_str()).collect();
    assert_eq!(order, [".", "app1"]);
    assert!(stack.built(".pip-overlay/click/__init__.py").is_file());
    assert!(stack.built("click/__init__.py").is_file());
    assert!(stack.built("app1/requests/__init__.py").is_file());
  }

  #[tokio::test]
  async fn nested_manifest_survives_its_ancestor() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app1/lib", &["six"]);

    let summary = build(&stack, &FakeToolchain::new()).await.unwrap();

    let order: Vec<&str> = summary.manifests.iter().map(|m| m.manifest.as_str()).collect();
    assert_eq!(order, ["app1", "app1/lib"]);
    assert!(stack.built(".pip-overlay/app1/lib/requirements.txt").is_file());
    assert!(stack.built("app1/lib/six/__init__.py").is_file());
    assert!(stack.built("app1/requests/__init__.py").is_file());

    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    assert!(runner.calls().is_empty());
    assert_eq!(summary.cached(), 2);
    assert!(stack.built("app1/lib/six/__init__.py").is_file());
  }

  #[tokio::test]
  async fn touched_ancestor_reinstalls_its_descendants() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app1/lib", &["six"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();

    stack.touch("app1/requirements.in", 60);
    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    assert_eq!(runner.count("compile"), 2);
    assert_eq!(summary.installed(), 2);
    assert!(stack.built("app1/lib/six/__init__.py").is_file());
    assert!(stack.built(".pip-overlay/app1/lib/requirements.txt").is_file());
  }

  #[tokio::test]
  async fn unchanged_rebuild_leaves_identical_tree() {
    let stack = TestStack::new();
    stack.write("app1/handler.py", "import requests");
    stack.write("app1/lib/util.py", "import six");
    stack.write("template.yaml", "Resources: {}");
    stack.manifest("", &["click"]);
    stack.manifest("app1", &["requests"]);
    stack.manifest("app1/lib", &["six"]);
    stack.manifest("app2", &["boto3"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();
    let first = stack.snapshot();

    let runner = FakeToolchain::new();
    build(&stack, &runner).await.unwrap();

    assert!(runner.calls().is_empty());
    assert_eq!(first, stack.snapshot());
    assert_eq!(first["app1/lib/six/__init__.py"], "six==1.0");
  }

  #[cfg(target_os = "linux")]
  #[tokio::test]
  async fn copied_mirror_still_hits_the_cache() {
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    let shm = Path::new("/dev/shm");
    if !shm.is_dir() {
      return;
    }
    let stack = TestStack::with_build_root(shm);
    stack.manifest("app1", &["requests"]);
    let build_parent = stack.build_dir().parent().unwrap().to_path_buf();
    if fs::metadata(stack.temp.path()).unwrap().dev() == fs::metadata(&build_parent).unwrap().dev() {
      // Hardlinks would work, nothing gets copied.
      return;
    }
    build(&stack, &FakeToolchain::new()).await.unwrap();

    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    assert!(summary.mirrored.copied > 0);
    assert!(runner.calls().is_empty());
    assert_eq!(summary.cached(), 1);
    assert!(stack.built("app1/requests/__init__.py").is_file());
  }

  #[tokio::test]
  async fn resolver_failure_aborts_with_command_context() {
    let stack = TestStack::new();
    stack.manifest("app1", &[UNRESOLVABLE]);
    let runner = FakeToolchain::new();

    let err = build(&stack, &runner).await.unwrap_err();

    assert!(matches!(
      &err,
      BuildError::Manifest {
        source: CacheError::Process(_),
        ..
      }
    ));
    let response = err.command_response().unwrap();
    assert_eq!(response.exit_code, 1);
    assert!(response.stderr[0].contains(UNRESOLVABLE));
    assert_eq!(runner.count("install"), 0);
    assert!(!stack.built(".pip-overlay/app1/requirements.txt").exists());
  }

  #[tokio::test]
  async fn failed_manifest_is_retried_on_next_build() {
    let stack = TestStack::new();
    stack.manifest("app1", &[UNRESOLVABLE]);
    assert!(build(&stack, &FakeToolchain::new()).await.is_err());

    stack.manifest("app1", &["requests"]);
    let runner = FakeToolchain::new();
    let summary = build(&stack, &runner).await.unwrap();

    assert_eq!(runner.count("compile"), 1);
    assert_eq!(summary.installed(), 1);
  }
}

mod parallel {
  use super::*;

  #[tokio::test]
  async fn jobs_bound_concurrency_and_keep_order() {
    let stack = TestStack::new();
    for app in ["app1", "app2", "app3", "app4"] {
      stack.manifest(app, &["requests"]);
    }
    let runner = FakeToolchain::with_delay(Duration::from_millis(20));
    let options = stack.options().with_jobs(2);

    let summary = Builder::new(options, runner.clone()).build().await.unwrap();

    assert_eq!(summary.installed(), 4);
    assert!(runner.max_in_flight() <= 2);
    let order: Vec<&str> = summary.manifests.iter().map(|m| m.manifest.as_str()).collect();
    assert_eq!(order, ["app1", "app2", "app3", "app4"]);
    for app in ["app1", "app2", "app3", "app4"] {
      assert!(stack.built(&format!("{}/requests/__init__.py", app)).is_file());
    }
  }

  #[tokio::test]
  async fn first_failure_aborts_parallel_build() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app2", &[UNRESOLVABLE]);
    stack.manifest("app3", &["requests"]);
    let options = stack.options().with_jobs(3);

    let err = Builder::new(options, FakeToolchain::new()).build().await.unwrap_err();

    assert!(err.is_command_failure());
    assert!(!stack.built("app1/requests").exists());
  }

  #[tokio::test]
  async fn nested_manifests_wait_for_their_ancestors() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app1/lib", &["six"]);
    stack.manifest("app2", &["boto3"]);
    let runner = FakeToolchain::with_delay(Duration::from_millis(10));
    let options = stack.options().with_jobs(3);

    let summary = Builder::new(options.clone(), runner.clone()).build().await.unwrap();

    let order: Vec<&str> = summary.manifests.iter().map(|m| m.manifest.as_str()).collect();
    assert_eq!(order, ["app1", "app2", "app1/lib"]);
    assert!(stack.built("app1/lib/six/__init__.py").is_file());
    assert!(stack.built("app1/requests/__init__.py").is_file());

    let runner = FakeToolchain::new();
    let summary = Builder::new(options, runner.clone()).build().await.unwrap();
    assert!(runner.calls().is_empty());
    assert_eq!(summary.cached(), 3);
  }

  #[tokio::test]
  async fn sequential_by_default() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    stack.manifest("app2", &["boto3"]);
    let runner = FakeToolchain::with_delay(Duration::from_millis(5));

    build(&stack, &runner).await.unwrap();

    assert_eq!(runner.max_in_flight(), 1);
  }
}

mod events {
  use super::*;

  #[tokio::test]
  async fn events_cover_every_phase() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    let reporter = Arc::new(RecordingReporter::new());

    Builder::new(stack.options(), FakeToolchain::new())
      .with_reporter(reporter.clone())
      .build()
      .await
      .unwrap();

    let events = reporter.events();
    assert!(matches!(events.first(), Some(BuildEvent::MirrorStarted { .. })));
    assert!(matches!(
      events.last(),
      Some(BuildEvent::BuildCompleted {
        installed: 1,
        cached: 0,
        ..
      })
    ));
    assert_eq!(reporter.count(|e| matches!(e, BuildEvent::RuntimeCreated { .. })), 1);
    assert_eq!(reporter.count(|e| matches!(e, BuildEvent::CommandCompleted { .. })), 4);
    assert_eq!(reporter.count(|e| matches!(e, BuildEvent::OverlayMerged { .. })), 1);
    assert!(events.contains(&BuildEvent::ManifestsFound {
      manifests: vec!["app1/requirements.in".to_string()],
    }));
  }

  #[tokio::test]
  async fn cached_manifest_reports_up_to_date() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);
    build(&stack, &FakeToolchain::new()).await.unwrap();
    let reporter = Arc::new(RecordingReporter::new());

    Builder::new(stack.options(), FakeToolchain::new())
      .with_reporter(reporter.clone())
      .build()
      .await
      .unwrap();

    assert!(reporter.events().contains(&BuildEvent::PackagesUpToDate {
      manifest: "app1".to_string(),
    }));
    assert_eq!(reporter.count(|e| matches!(e, BuildEvent::CommandCompleted { .. })), 0);
  }

  #[tokio::test]
  async fn outcomes_serialize_for_json_output() {
    let stack = TestStack::new();
    stack.manifest("app1", &["requests"]);

    let summary = build(&stack, &FakeToolchain::new()).await.unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["manifests"][0]["manifest"], "app1");
    assert_eq!(json["manifests"][0]["outcome"], "installed");
    assert_eq!(summary.manifests[0].outcome, CacheOutcome::Installed);
  }
}
