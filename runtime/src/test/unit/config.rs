//! Build configuration and toolchain command tests.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use kernlink_dtype::Backend;
use test_case::test_case;

use crate::config::{BuildConfig, DEFAULT_CXX, DEFAULT_NVCC, parse_backends};
use crate::toolchain::{CompileRequest, SystemToolchain};
use crate::Error;

#[test]
fn test_builder_defaults() {
    let config = BuildConfig::builder().build();
    assert_eq!(config, BuildConfig::default());
    assert_eq!(config.backends, vec![Backend::Cpu]);
    assert_eq!(config.cxx, DEFAULT_CXX);
    assert_eq!(config.nvcc, DEFAULT_NVCC);
    assert!(config.support_dir.is_none());
}

#[test]
fn test_builder_overrides() {
    let config = BuildConfig::builder()
        .backends(vec![Backend::Cuda])
        .cxx("clang++".to_string())
        .cxx_flags(vec!["-march=native".to_string()])
        .support_dir(PathBuf::from("/opt/kernlink/support"))
        .build();

    assert_eq!(config.backends, vec![Backend::Cuda]);
    assert_eq!(config.cxx, "clang++");
    assert_eq!(config.cxx_flags, vec!["-march=native"]);
    assert_eq!(config.support_dir.as_deref(), Some(Path::new("/opt/kernlink/support")));
}

#[test_case("cpu", vec![Backend::Cpu] ; "single")]
#[test_case("cpu,cuda", vec![Backend::Cpu, Backend::Cuda] ; "pair")]
#[test_case(" CUDA , cpu ", vec![Backend::Cuda, Backend::Cpu] ; "whitespace and case")]
#[test_case("cpu,,", vec![Backend::Cpu] ; "trailing commas")]
fn test_parse_backends(list: &str, expected: Vec<Backend>) {
    assert_eq!(parse_backends(list).unwrap(), expected);
}

#[test_case("tpu" ; "unknown")]
#[test_case("" ; "empty")]
#[test_case(" , " ; "only separators")]
fn test_parse_backends_rejects(list: &str) {
    assert!(matches!(parse_backends(list), Err(Error::InvalidConfig { .. })));
}

#[test]
fn test_requested_backends_dedup() {
    let config = BuildConfig::builder().backends(vec![Backend::Cuda, Backend::Cpu, Backend::Cuda]).build();
    assert_eq!(config.requested_backends(), vec![Backend::Cuda, Backend::Cpu]);
}

#[test]
fn test_validate() {
    assert!(BuildConfig::default().validate().is_ok());
    let empty = BuildConfig::builder().backends(vec![]).build();
    assert!(matches!(empty.validate(), Err(Error::InvalidConfig { .. })));
    let no_nvcc = BuildConfig::builder().backends(vec![Backend::Cuda]).nvcc(String::new()).build();
    assert!(no_nvcc.validate().is_err());
}

fn command_line(config: &BuildConfig, backend: Backend) -> (String, Vec<String>) {
    let sources = vec![PathBuf::from("build/add_wrapper.cpp"), PathBuf::from("build/support/context.cpp")];
    let include_dirs = vec![PathBuf::from("build/support")];
    let request =
        CompileRequest { backend, sources: &sources, include_dirs: &include_dirs, output: Path::new("build/out.so") };
    let cmd = SystemToolchain::new(config).command(&request);
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args = cmd.get_args().map(OsStr::to_string_lossy).map(|a| a.into_owned()).collect();
    (program, args)
}

#[test]
fn test_host_command_line() {
    let config = BuildConfig::builder().cxx("clang++".to_string()).cxx_flags(vec!["-g".to_string()]).build();
    let (program, args) = command_line(&config, Backend::Cpu);

    assert_eq!(program, "clang++");
    for expected in ["-shared", "-fPIC", "-DKERNLINK_USE_CPU", "-g", "build/support", "build/out.so"] {
        assert!(args.iter().any(|a| a == expected), "missing {expected} in {args:?}");
    }
    assert_eq!(&args[args.len() - 2..], ["build/add_wrapper.cpp", "build/support/context.cpp"]);
}

#[test]
fn test_cuda_command_line() {
    let (program, args) = command_line(&BuildConfig::default(), Backend::Cuda);

    assert_eq!(program, "nvcc");
    assert!(args.windows(2).any(|w| w == ["-x", "cu"]), "{args:?}");
    assert!(args.windows(2).any(|w| w == ["-Xcompiler", "-fPIC"]), "{args:?}");
    assert!(args.iter().any(|a| a == "-DKERNLINK_USE_CUDA"));
}
