use super::common::{TestEnv, lua_str};

#[test]
fn helpers_are_directory_qualified() {
  let env = TestEnv::new();
  env.write_file("src/b.c", "");
  env.write_file("src/a.c", "");
  env.write_file("src/notes.txt", "");
  env.write_spec(
    "src",
    &format!(
      r#"
      local root = {root}
      function check()
        assert(dir() == root .. "/src", dir())
        assert(build_dir() == root .. "/src/build", build_dir())
        assert(file("a.c") == root .. "/src/a.c")
        local both = file({{ "a.c", "b.c" }})
        assert(both[2] == root .. "/src/b.c")
        local found = glob("*.c")
        assert(#found == 2 and found[1] == root .. "/src/a.c" and found[2] == root .. "/src/b.c")
      end
      "#,
      root = lua_str(env.root())
    ),
  );
  env.write_spec("", r#"function all() project("src").check() end"#);

  env.run("all").unwrap();
}

#[test]
fn project_returns_one_instance_per_script() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local a = project("lib")
    local b = project("./lib/build.lua")
    function all()
      assert(a == b, "same script should give the same proxy")
      assert(a.loads == 1)
    end
    "#,
  );
  env.write_spec("lib", "loads = (loads or 0) + 1");

  let report = env.run("all").unwrap();
  assert_eq!(report.specs_loaded, 2);
}

#[test]
fn proxy_exposes_plain_values() {
  let env = TestEnv::new();
  env.write_spec("", r#"local lib = project("lib"); function all() assert(lib.version == "1.2") end"#);
  env.write_spec("lib", r#"version = "1.2""#);

  env.run("all").unwrap();
}

#[test]
fn spec_referencing_itself_fails_to_load() {
  let env = TestEnv::new();
  env.write_spec("", r#"project(".")"#);

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("references itself"), "{err}");
}

#[test]
fn mutually_dependent_tasks_are_a_cycle() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    local a = project("a")
    function all() a.ping() end
    "#,
  );
  env.write_spec("a", r#"function ping() project("../b").pong() end"#);
  env.write_spec("b", r#"function pong() project("../a").ping() end"#);

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("dependency cycle detected"), "{err}");
}

#[test]
fn load_composes_definitions() {
  let env = TestEnv::new();
  env.write_file("common.lua", "function shared() return 42 end\nloaded_from = __dir");
  env.write_spec(
    "",
    r#"
    load("common.lua")
    function all() assert(shared() == 42) end
    "#,
  );

  env.run("all").unwrap();
  env.run("shared").unwrap();
}

#[test]
fn script_plugin_extends_spec() {
  let mut env = TestEnv::new();
  env.write_file("plugins/greet.lua", r#"function greet(name) return "hello " .. name end"#);
  env.config.plugin_dirs = vec![env.path("plugins")];
  env.write_spec(
    "",
    r#"
    plugin("greet")
    plugin("greet")
    function all() assert(greet("rmk") == "hello rmk") end
    "#,
  );

  env.run("all").unwrap();
}

#[test]
fn plugins_stay_per_spec() {
  let mut env = TestEnv::new();
  env.write_file("plugins/greet.lua", r#"function greet(name) return "hello " .. name end"#);
  env.config.plugin_dirs = vec![env.path("plugins")];
  env.write_spec(
    "",
    r#"
    plugin("greet")
    local lib = project("lib")
    function all() assert(lib.has_greet() == false) end
    "#,
  );
  env.write_spec("lib", r#"function has_greet() return greet ~= nil end"#);

  env.run("all").unwrap();
}

#[test]
fn unknown_plugin_fails_to_load() {
  let env = TestEnv::new();
  env.write_spec("", r#"plugin("missing")"#);

  let err = env.run("all").unwrap_err();
  assert!(err.to_string().contains("unknown plugin 'missing'"), "{err}");
}

#[test]
fn builtin_cc_plugin_is_available() {
  let env = TestEnv::new();
  env.write_spec(
    "",
    r#"
    plugin("cc")
    function all() assert(type(compile_c) == "function" and type(link_c) == "function") end
    "#,
  );

  env.run("all").unwrap();
}
