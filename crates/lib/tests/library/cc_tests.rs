//! The built-in `cc` capability, driven by a fake compiler that records each
//! invocation and writes a depfile naming `util.h`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;

use super::common::{TestEnv, lua_str, touch_ahead};

const FAKE_CC: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/calls.log"
dep=""
src=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -MF) dep="$2"; shift 2 ;;
    -c) src="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ -n "$dep" ]; then
  printf '%s: %s %s\n' "$out" "$src" "$(dirname "$src")/util.h" > "$dep"
fi
echo built > "$out"
"#;

fn cc_env() -> TestEnv {
  let env = TestEnv::new();
  let cc = env.write_file("fakecc", FAKE_CC);
  std::fs::set_permissions(&cc, std::fs::Permissions::from_mode(0o755)).unwrap();
  env.write_file("main.c", "int main() { return 0; }");
  env.write_file("util.c", "");
  env.write_file("util.h", "");
  env.write_spec(
    "",
    &format!(
      r#"
      plugin("cc")
      local cc = {cc}
      function all()
        local objects = compile_c({{ "main.c", "util.c" }}, {{ cc = cc, cflags = "-O2" }})
        return link_c(objects, "build/app", {{ cc = cc }})
      end
      "#,
      cc = lua_str(&cc)
    ),
  );
  env
}

#[test]
fn compiles_and_links() {
  let env = cc_env();
  env.run("all").unwrap();

  assert!(env.path("build/obj/main.o").exists());
  assert!(env.path("build/obj/util.o").exists());
  assert!(env.path("build/app").exists());
  assert_eq!(env.count_lines("calls.log"), 3);
}

#[test]
fn up_to_date_build_runs_nothing() {
  let env = cc_env();
  env.run("all").unwrap();
  env.run("all").unwrap();
  assert_eq!(env.count_lines("calls.log"), 3);
}

#[test]
fn touched_source_recompiles_only_that_object() {
  let env = cc_env();
  env.run("all").unwrap();
  touch_ahead(&env.path("main.c"), 30);
  env.run("all").unwrap();

  let log = std::fs::read_to_string(env.path("calls.log")).unwrap();
  let rebuilt: Vec<&str> = log.lines().skip(3).collect();
  assert_eq!(rebuilt.len(), 2, "{log}");
  assert!(rebuilt[0].contains("main.c"));
  assert!(rebuilt[1].contains("-o") && rebuilt[1].ends_with("build/app"));
}

#[test]
fn deleted_object_is_rebuilt() {
  let env = cc_env();
  env.run("all").unwrap();
  std::fs::remove_file(env.path("build/obj/main.o")).unwrap();
  env.run("all").unwrap();

  assert!(env.path("build/obj/main.o").exists());
  let log = std::fs::read_to_string(env.path("calls.log")).unwrap();
  let rebuilt: Vec<&str> = log.lines().skip(3).collect();
  assert_eq!(rebuilt.len(), 2, "{log}");
  assert!(rebuilt[0].contains("main.c"));
  assert!(rebuilt[1].ends_with("build/app"));
}

#[test]
fn deleted_binary_is_relinked() {
  let env = cc_env();
  env.run("all").unwrap();
  std::fs::remove_file(env.path("build/app")).unwrap();
  env.run("all").unwrap();

  assert!(env.path("build/app").exists());
  assert_eq!(env.count_lines("calls.log"), 4);
}

#[test]
fn touched_header_recompiles_dependents() {
  let env = cc_env();
  env.run("all").unwrap();
  touch_ahead(&env.path("util.h"), 30);
  env.run("all").unwrap();
  assert_eq!(env.count_lines("calls.log"), 6);
}
