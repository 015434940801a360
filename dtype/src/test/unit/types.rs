use std::str::FromStr;

use strum::VariantArray;
use test_case::test_case;

use crate::*;

#[test_case("int", ParamType::Int ; "int scalar")]
#[test_case("float", ParamType::Float ; "float scalar")]
#[test_case("IN", ParamType::In ; "input buffer")]
#[test_case("OUT", ParamType::Out ; "output buffer")]
fn test_param_type_tokens(token: &str, expected: ParamType) {
    assert_eq!(ParamType::from_str(token).unwrap(), expected);
    assert_eq!(expected.as_ref(), token);
}

#[test_case("double" ; "double")]
#[test_case("in" ; "lowercase in")]
#[test_case("void" ; "void")]
#[test_case("float*" ; "raw pointer")]
#[test_case("" ; "empty")]
fn test_param_type_rejects(token: &str) {
    assert!(ParamType::from_str(token).is_err(), "{token:?} should not be a parameter type");
}

#[test]
fn test_return_type_tokens() {
    for ty in ReturnType::VARIANTS {
        assert_eq!(ReturnType::from_str(ty.as_ref()).unwrap(), *ty);
    }
    assert!(ReturnType::from_str("IN").is_err());
    assert_eq!(ReturnType::default(), ReturnType::Void);
}

#[test]
fn test_backend_parse_and_suffix() {
    assert_eq!(Backend::from_str("cpu").unwrap(), Backend::Cpu);
    assert_eq!(Backend::from_str("CUDA").unwrap(), Backend::Cuda);
    assert!(Backend::from_str("metal").is_err());
    assert_ne!(Backend::Cpu.suffix(), Backend::Cuda.suffix());
    assert!(Backend::Cuda.is_accelerator());
    assert!(!Backend::Cpu.is_accelerator());
}

#[test]
fn test_device_spec() {
    let cuda = DeviceSpec::Cuda { device_id: 1 };
    assert_eq!(cuda.backend(), Backend::Cuda);
    assert_eq!(cuda.device_id(), Some(1));
    assert_eq!(cuda.to_string(), "CUDA:1");
    assert_eq!(DeviceSpec::default(), DeviceSpec::Cpu);
    assert_eq!(DeviceSpec::Cpu.device_id(), None);
}

#[test]
fn test_has_dtype() {
    assert_eq!(<f32 as HasDType>::DTYPE, KERNEL_ELEMENT);
    assert_eq!(<f64 as HasDType>::DTYPE, DType::Float64);
    assert_eq!(<u8 as HasDType>::DTYPE.to_string(), "UInt8");
    assert_eq!(DType::VARIANTS.iter().filter(|d| **d == KERNEL_ELEMENT).count(), 1);
}
