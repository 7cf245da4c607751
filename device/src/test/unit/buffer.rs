use strum::VariantArray;

use crate::element::{Element, ElementType};
use crate::error::{Error, Status};
use crate::{DeviceBuffer, Runtime};

fn round_trip<T: Element + PartialEq + std::fmt::Debug>(values: Vec<T>) {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let buffer = DeviceBuffer::from_slice(&ctx, &values).unwrap();
    assert_eq!(buffer.element_type(), T::ELEMENT_TYPE);
    assert_eq!(buffer.to_vec::<T>().unwrap(), values);
}

#[test]
fn test_round_trip_covers_every_element_type() {
    round_trip(vec![1.5f32, -2.5, 0.0]);
    round_trip(vec![1.5f64, -2.5, 0.0]);
    round_trip(vec![i32::MIN, 0, i32::MAX]);
    round_trip(vec![i64::MIN, 0, i64::MAX]);
}

#[test]
fn test_round_trip_through_a_pool() {
    let runtime = Runtime::host();
    let pool = runtime.install_pool(0, 1 << 20, 8 << 20).unwrap();
    let mut ctx = runtime.create_context().unwrap();

    let host: Vec<f32> = (0..10_000).map(|i| (i % 97) as f32 * 0.5).collect();
    let mut buffer = DeviceBuffer::from_slice(&ctx, &host).unwrap();
    assert_eq!(buffer.len(), 10_000);
    assert_eq!(buffer.element_type(), ElementType::F32);
    assert_eq!(buffer.to_vec::<f32>().unwrap(), host);

    buffer.release().unwrap();
    ctx.free().unwrap();
    runtime.reset_resource(&pool).unwrap();
}

#[test]
fn test_zero_length_buffers_are_valid() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();

    let mut buffer = DeviceBuffer::from_slice::<f32>(&ctx, &[]).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.size_bytes(), 0);
    assert_eq!(buffer.to_vec::<f32>().unwrap(), Vec::<f32>::new());

    buffer.release().unwrap();
    assert_eq!(buffer.release().unwrap_err().status(), Status::HandleMisuse);
}

#[test]
fn test_element_tag_is_enforced() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let buffer = DeviceBuffer::from_slice(&ctx, &[1.0f32, 2.0]).unwrap();

    let err = buffer.to_vec::<i32>().unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
    assert!(matches!(
        err,
        Error::ElementMismatch { actual: ElementType::F32, requested: ElementType::I32 }
    ));
}

#[test]
fn test_copyout_checks_the_length() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let buffer = DeviceBuffer::from_slice(&ctx, &[1i64, 2, 3]).unwrap();

    let mut short = vec![0i64; 2];
    let err = buffer.copyout(&mut short).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 3, actual: 2 }));
}

#[test]
fn test_copyin_overwrites_device_contents() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let mut buffer = DeviceBuffer::from_slice(&ctx, &[0i32; 4]).unwrap();

    buffer.copyin(&[9i32, 8, 7, 6]).unwrap();
    assert_eq!(buffer.to_vec::<i32>().unwrap(), vec![9, 8, 7, 6]);

    let err = buffer.copyin(&[1i32, 2]).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 4, actual: 2 }));
    let err = buffer.copyin(&[1.0f32, 2.0, 3.0, 4.0]).unwrap_err();
    assert!(matches!(err, Error::ElementMismatch { .. }));
}

#[test]
fn test_double_release_is_misuse() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let mut buffer = DeviceBuffer::from_slice(&ctx, &[1.0f32; 16]).unwrap();

    buffer.release().unwrap();
    let err = buffer.release().unwrap_err();
    assert_eq!(err.status(), Status::HandleMisuse);

    let err = buffer.to_vec::<f32>().unwrap_err();
    assert_eq!(err.status(), Status::HandleMisuse);

    // Introspection still works on a released handle.
    assert_eq!(buffer.len(), 16);
    assert_eq!(buffer.size_bytes(), 64);
}

#[test]
fn test_failed_arena_upload_leaves_nothing_behind() {
    let runtime = Runtime::host();
    let arena = runtime.install_arena(0, Some(1024)).unwrap();
    let ctx = runtime.create_context().unwrap();

    let err = DeviceBuffer::from_slice(&ctx, &vec![0.0f32; 512]).unwrap_err();
    assert_eq!(err.status(), Status::AllocationFailure);
    assert!(matches!(err, Error::ArenaExhausted { .. }));
    assert_eq!(arena.outstanding(), 0);

    // The region still serves requests that fit.
    let mut small = DeviceBuffer::from_slice(&ctx, &vec![0.25f32; 128]).unwrap();
    assert_eq!(arena.outstanding(), 1);
    assert_eq!(small.to_vec::<f32>().unwrap(), vec![0.25f32; 128]);

    small.release().unwrap();
    runtime.reset_resource(&arena).unwrap();
}

#[test]
fn test_release_routes_to_the_original_resource() {
    let runtime = Runtime::host();
    let pool = runtime.install_pool(0, 4096, 8192).unwrap();
    let ctx = runtime.create_context().unwrap();
    let mut buffer = DeviceBuffer::from_slice(&ctx, &[1i32; 64]).unwrap();
    assert_eq!(pool.outstanding(), 1);

    // A newer resource does not capture frees of older buffers.
    let arena = runtime.install_arena(0, Some(4096)).unwrap();
    buffer.release().unwrap();
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(arena.outstanding(), 0);

    runtime.reset_resource(&arena).unwrap();
    runtime.reset_resource(&pool).unwrap();
}

#[test]
fn test_zeroed_allocates_cleared_memory() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let buffer = DeviceBuffer::zeroed::<i64>(&ctx, 33).unwrap();
    assert_eq!(buffer.len(), 33);
    assert_eq!(buffer.element_type(), ElementType::I64);
    assert_eq!(buffer.to_vec::<i64>().unwrap(), vec![0i64; 33]);
}

#[test]
fn test_size_accounts_for_the_element_width() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    let buffer = DeviceBuffer::from_slice(&ctx, &[1.0f64; 10]).unwrap();
    assert_eq!(buffer.size_bytes(), 80);
    assert_eq!(buffer.element_type().bytes(), 8);
}

#[test]
fn test_element_tags_are_stable() {
    for element in ElementType::VARIANTS {
        assert_eq!(ElementType::from_repr(*element as u8), Some(*element));
        assert!(element.bytes() > 0);
    }
    assert_eq!(ElementType::F32.bytes(), 4);
    assert_eq!(ElementType::F64.bytes(), 8);
    assert_eq!(ElementType::I32.bytes(), 4);
    assert_eq!(ElementType::I64.bytes(), 8);
}
