use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::{env, io};
extern crate pkg_config;

fn build_z3(dir_z3: &Path) -> io::Result<ExitStatus> {
    let dir_tmp = dir_z3.join("build");
    std::fs::create_dir_all(&dir_tmp)?;
    let status = Command::new("cmake")
        .arg("-G")
        .arg("Ninja")
        .arg("-DCMAKE_BUILD_TYPE=Release")
        .arg(format!(
            "-DCMAKE_INSTALL_PREFIX={}",
            dir_tmp.join("install").display()
        ))
        .arg("../")
        .current_dir(&dir_tmp)
        .status()?;
    if !status.success() {
        return Ok(status);
    }
    Command::new("ninja")
        .arg("install")
        .current_dir(dir_tmp)
        .status()
}

fn with_pkg_config_dir(dir: PathBuf) {
    let old = env::var("PKG_CONFIG_PATH");
    match old {
        Ok(ref s) => {
            let mut paths = env::split_paths(s).collect::<Vec<PathBuf>>();
            paths.push(dir);
            if let Ok(paths) = env::join_paths(paths) {
                env::set_var("PKG_CONFIG_PATH", paths)
            }
        }
        Err(_) => env::set_var("PKG_CONFIG_PATH", dir),
    }
}

fn main() {
    println!("cargo::rerun-if-changed=build.rs");
    println!("cargo::rerun-if-env-changed=POLYSMT_Z3_SOURCE");
    println!("cargo::rerun-if-changed=wrapper.h");

    // A source checkout is only built when explicitly requested, the system
    // library is used otherwise.
    if let Ok(source) = env::var("POLYSMT_Z3_SOURCE") {
        let dir_z3 = PathBuf::from(source);
        if !dir_z3.join("build/install").exists() {
            match build_z3(&dir_z3) {
                Ok(status) if status.success() => {}
                Ok(status) => panic!("building z3 in {} failed: {status}", dir_z3.display()),
                Err(err) => panic!("building z3 in {} failed: {err}", dir_z3.display()),
            }
        }
        with_pkg_config_dir(dir_z3.join("build/install/lib/pkgconfig"));
    }

    let include_paths = match pkg_config::probe_library("z3") {
        Ok(library) => library.include_paths,
        Err(_) => {
            println!("cargo:rustc-link-lib=z3");
            Vec::new()
        }
    };

    let bindings = bindgen::builder()
        .header("wrapper.h")
        .clang_args(
            include_paths
                .iter()
                .map(|path| format!("-I{}", path.to_string_lossy())),
        )
        .allowlist_function("Z3_.*")
        .allowlist_type("Z3_.*")
        .allowlist_var("Z3_.*")
        .prepend_enum_name(false)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}
