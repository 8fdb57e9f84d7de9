use rmk_lib::graph::NodeState;
use rmk_lib::{ErrorMode, RunError};

use super::common::TestEnv;

#[test]
fn runs_requested_task() {
  let env = TestEnv::new();
  env.write_spec("", "function all() end\nfunction other() end");

  let report = env.run("other").unwrap();
  assert_eq!(report.task, "other");
  assert_eq!(report.spec, env.path("build.lua"));
  assert_eq!(report.specs_loaded, 1);
  assert_eq!(report.graph.nodes.len(), 1);
  assert_eq!(report.graph.nodes[0].name, "other");
}

#[test]
fn unknown_task_is_an_error() {
  let env = TestEnv::new();
  env.write_spec("", "function all() end");

  let err = env.run("nope").unwrap_err();
  assert!(matches!(err, RunError::Task(_)), "{err:?}");
  assert!(err.to_string().contains("unknown task 'nope'"), "{err}");
}

#[test]
fn task_error_names_spec_and_operation() {
  let env = TestEnv::new();
  env.write_spec("", r#"function all() error("broken build") end"#);

  let err = env.run("all").unwrap_err();
  let message = err.to_string();
  assert!(message.starts_with(&format!("{}:all : ", env.path("build.lua").display())), "{message}");
  assert!(message.contains("broken build"), "{message}");
}

#[test]
fn tagged_errors_carry_their_kind() {
  let mut env = TestEnv::new();
  env.config.error_mode = ErrorMode::Tagged;
  env.write_spec("", r#"function all() error("broken build") end"#);

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("[runtime]"), "{err}");
}

#[test]
fn nested_task_errors_propagate_to_the_root() {
  let env = TestEnv::new();
  env.write_spec("", r#"local lib = project("lib"); function all() lib.compile() end"#);
  env.write_spec("lib", r#"function compile() error("missing header") end"#);

  let err = env.run("all").unwrap_err();
  let message = err.to_string();
  assert!(message.contains("missing header"), "{message}");
  assert!(message.contains(&format!("{}:compile", env.path("lib/build.lua").display())), "{message}");
}

#[test]
#[cfg(unix)]
fn shared_dependency_runs_once() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local app = project("app")
    local lib = project("lib")
    function all()
      parallel({ "x", "y" }, function(name) return app.build(name) end)
      lib.prepare()
    end
    "#,
  );
  env.write_spec(
    "app",
    r#"
    local lib = project("../lib")
    function build(name)
      lib.prepare()
      return name
    end
    "#,
  );
  env.write_spec(
    "lib",
    r#"
    function prepare()
      system("sleep 0.1; echo prepared >> '" .. file("count.txt") .. "'")
    end
    "#,
  );

  let report = env.run("all").unwrap();
  assert_eq!(env.count_lines("lib/count.txt"), 1);
  assert_eq!(report.specs_loaded, 3);

  let graph = &report.graph;
  let names: Vec<&str> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
  assert_eq!(names.iter().filter(|n| **n == "prepare").count(), 1);
  assert_eq!(names.iter().filter(|n| **n == "build").count(), 2);

  let prepare = graph.nodes.iter().find(|n| n.name == "prepare").unwrap().id;
  for node in graph.nodes.iter().filter(|n| n.name != "prepare") {
    assert!(node.children.contains(&prepare), "{} should request prepare", node.identity);
  }
  assert!(graph.nodes.iter().all(|n| n.state == NodeState::Succeeded));
}

#[test]
fn failed_task_is_retried_then_memoized() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local flaky = project("flaky")
    function all()
      local ok = pcall(flaky.attempt)
      assert(not ok, "first attempt should fail")
      assert(flaky.attempt() == 2)
      assert(flaky.attempt() == 2)
      assert(flaky:attempt() == 2)
    end
    "#,
  );
  env.write_spec(
    "flaky",
    r#"
    attempts = 0
    function attempt()
      attempts = attempts + 1
      if attempts < 2 then
        error("not yet")
      end
      return attempts
    end
    "#,
  );

  let report = env.run("all").unwrap();
  let attempt = report.graph.nodes.iter().find(|n| n.name == "attempt").unwrap();
  assert_eq!(attempt.state, NodeState::Succeeded);
  assert_eq!(attempt.error, None);
}

#[test]
fn memo_distinguishes_arguments() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local lib = project("lib")
    function all()
      lib.object("a.c", { flags = { "-O2" } })
      lib.object("a.c", { flags = { "-O2" } })
      lib.object("b.c", { flags = { "-O2" } })
      assert(lib.calls() == 2, "object should run once per distinct argument list")
    end
    "#,
  );
  env.write_spec(
    "lib",
    r#"
    local count = 0
    function object(name, opts)
      count = count + 1
      return name .. ".o"
    end
    function calls() return count end
    "#,
  );

  env.run("all").unwrap();
}

#[test]
#[cfg(unix)]
fn parallel_keeps_input_order() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    function all()
      local out = parallel({ 3, 1, 2 }, function(n)
        system("sleep 0." .. n)
        return n * 10
      end)
      assert(#out == 3)
      assert(out[1] == 30 and out[2] == 10 and out[3] == 20)
    end
    "#,
  );

  env.run("all").unwrap();
}

#[test]
#[cfg(unix)]
fn parallel_reports_first_failure_by_position() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    function all()
      parallel({ 1, 2 }, function(n)
        if n == 2 then
          error("second failed")
        end
        system("sleep 0.1")
        error("first failed")
      end)
    end
    "#,
  );

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("first failed"), "{err}");
}

#[test]
#[cfg(unix)]
fn failing_command_fails_the_task() {
  let env = TestEnv::new();
  env.write_spec("", r#"function all() system("exit 3") end"#);

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("exit 3"), "{err}");
}

#[test]
fn graph_survives_a_failed_build() {
  let env = TestEnv::new();
  env.write_spec("", r#"local lib = project("lib"); function all() lib.ok(); lib.bad() end"#);
  env.write_spec("lib", r#"function ok() end; function bad() error("nope") end"#);

  let engine = rmk_lib::Engine::new(env.config.clone());
  assert!(engine.run(env.root(), "all").is_err());

  let graph = engine.graph();
  let state = |name: &str| graph.nodes.iter().find(|n| n.name == name).unwrap().state;
  assert_eq!(state("ok"), NodeState::Succeeded);
  assert_eq!(state("bad"), NodeState::Failed);
  assert_eq!(state("all"), NodeState::Failed);
}
