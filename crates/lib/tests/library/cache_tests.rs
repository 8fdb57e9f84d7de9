use std::fs;

use super::common::{TestEnv, touch_ahead};

/// Appends a line to runs.txt each time the step really runs.
const CACHED_SPEC: &str = r#"
function all()
  local out = build_cache({ "input.txt" }, function(hidden)
    table.insert(hidden, "extra.h")
    local log = io.open(file("runs.txt"), "a")
    log:write("run\n")
    log:close()
    return { object = "input.o", flags = { "-O2" } }
  end)
  local value = out:value()
  assert(value.object == "input.o" and value.flags[1] == "-O2")
end
"#;

fn cached_env() -> TestEnv {
  let env = TestEnv::new();
  env.write_spec("", CACHED_SPEC);
  env.write_file("input.txt", "data");
  env.write_file("extra.h", "");
  env
}

#[test]
fn value_is_reused_across_runs() {
  let env = cached_env();
  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(env.count_lines("runs.txt"), 1);
}

#[test]
fn touched_input_rebuilds() {
  let env = cached_env();
  env.run("all").unwrap();
  touch_ahead(&env.path("input.txt"), 30);
  env.run("all").unwrap();
  assert_eq!(env.count_lines("runs.txt"), 2);
}

#[test]
fn touched_discovered_dependency_rebuilds() {
  let env = cached_env();
  env.run("all").unwrap();
  touch_ahead(&env.path("extra.h"), 30);
  env.run("all").unwrap();
  assert_eq!(env.count_lines("runs.txt"), 2);
}

#[test]
fn missing_discovered_dependency_rebuilds() {
  let env = cached_env();
  env.run("all").unwrap();
  fs::remove_file(env.path("extra.h")).unwrap();
  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(env.count_lines("runs.txt"), 3);
}

#[test]
fn entries_live_under_build_cache() {
  let env = cached_env();
  env.run("all").unwrap();

  let names: Vec<String> = fs::read_dir(env.path("build/cache"))
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  assert_eq!(names.len(), 2, "{names:?}");
  assert!(names.iter().any(|n| n.ends_with(".dep")));
}

#[test]
fn failed_step_writes_nothing() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    function all()
      return build_cache({}, function()
        local flag = io.open(file("fail"), "r")
        if flag then
          flag:close()
          error("step failed")
        end
        local log = io.open(file("runs.txt"), "a")
        log:write("run\n")
        log:close()
        return true
      end):value()
    end
    "#,
  );
  env.write_file("fail", "");

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("step failed"), "{err}");
  assert!(!env.path("build/cache").exists() || fs::read_dir(env.path("build/cache")).unwrap().next().is_none());

  fs::remove_file(env.path("fail")).unwrap();
  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(env.count_lines("runs.txt"), 1);
}

#[test]
fn call_sites_get_separate_entries() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    function all()
      local a = build_cache({ { mtime = 0 } }, function() return "a" end)
      local b = build_cache({ { mtime = 0 } }, function() return "b" end)
      assert(a:value() == "a" and b:value() == "b")
      assert(a.entry ~= b.entry)
    end
    "#,
  );

  env.run("all").unwrap();
  let entries = fs::read_dir(env.path("build/cache")).unwrap().count();
  assert_eq!(entries, 2);
}

#[test]
fn tail_calling_helpers_get_separate_entries() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local function compile_a()
      return build_cache({}, function() return "a" end)
    end
    local function compile_b()
      return build_cache({}, function() return "b" end)
    end
    function all()
      local out = parallel({ compile_a, compile_b }, function(compile)
        return compile():value()
      end)
      local log = io.open(file("out.txt"), "a")
      log:write(table.concat(out, ","), "\n")
      log:close()
    end
    "#,
  );

  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(fs::read_to_string(env.path("out.txt")).unwrap(), "a,b\na,b\n");
  assert_eq!(fs::read_dir(env.path("build/cache")).unwrap().count(), 2);
}

#[test]
fn future_dependency_chains_entries() {
  let env = TestEnv::new();
  env.write_file("a.c", "");
  env.write_spec(
    "",
    r#"
    function all()
      local object = build_cache({ "a.c" }, function()
        local log = io.open(file("compiles.txt"), "a")
        log:write("compile\n")
        log:close()
        return "a.o"
      end)
      local binary = build_cache({ object }, function()
        local log = io.open(file("links.txt"), "a")
        log:write("link\n")
        log:close()
        return "app"
      end)
      assert(binary:value() == "app")
    end
    "#,
  );

  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(env.count_lines("compiles.txt"), 1);
  assert_eq!(env.count_lines("links.txt"), 1);

  touch_ahead(&env.path("a.c"), 30);
  env.run("all").unwrap();
  assert_eq!(env.count_lines("compiles.txt"), 2);
  assert_eq!(env.count_lines("links.txt"), 2);
}
