use std::sync::Arc;

use crate::backend::HostBackend;
use crate::error::{Error, Status};
use crate::resource::DeviceResource;
use crate::{ContextOptions, DeviceBuffer, ResourceKind, Runtime};

#[test]
fn test_context_binds_device_and_stream() {
    let runtime = Runtime::host();
    let ctx = runtime.create_context().unwrap();
    assert_eq!(ctx.device().unwrap(), 0);
    assert!(!ctx.stream().unwrap().is_default());
    assert!(!ctx.is_freed());
}

#[test]
fn test_free_is_detected_the_second_time() {
    let runtime = Runtime::host();
    let mut ctx = runtime.create_context().unwrap();
    ctx.free().unwrap();
    assert!(ctx.is_freed());

    let err = ctx.free().unwrap_err();
    assert_eq!(err.status(), Status::HandleMisuse);
    assert!(matches!(err, Error::HandleFreed { .. }));
}

#[test]
fn test_operations_through_a_freed_context_fail() {
    let runtime = Runtime::host();
    let mut ctx = runtime.create_context().unwrap();
    ctx.free().unwrap();

    assert_eq!(ctx.device().unwrap_err().status(), Status::HandleMisuse);
    assert_eq!(ctx.stream().unwrap_err().status(), Status::HandleMisuse);
    assert_eq!(ctx.resource().unwrap_err().status(), Status::HandleMisuse);

    let err = DeviceBuffer::from_slice(&ctx, &[1.0f32]).unwrap_err();
    assert_eq!(err.status(), Status::HandleMisuse);
}

#[test]
fn test_explicit_stream_must_match_the_device() {
    let runtime = Runtime::with_backend(Arc::new(HostBackend::with_layout(2, 1 << 20)));
    let stream_on_one = runtime.get_or_create_stream(1).unwrap();

    let err =
        runtime.create_context_with(ContextOptions { device: 0, stream: Some(stream_on_one) }).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
    assert!(matches!(err, Error::StreamAffinity { stream_device: 1, handle_device: 0 }));
}

#[test]
fn test_explicit_default_stream_is_accepted() {
    let runtime = Runtime::host();
    let default = runtime.default_stream(0).unwrap();
    let ctx = runtime
        .create_context_with(ContextOptions { device: 0, stream: Some(Arc::clone(&default)) })
        .unwrap();

    assert!(ctx.stream().unwrap().is_default());
    // The registry was never consulted.
    assert!(runtime.stream_registry().cached(0).is_none());

    let buffer = DeviceBuffer::from_slice(&ctx, &[3i32, 4]).unwrap();
    assert_eq!(buffer.to_vec::<i32>().unwrap(), vec![3, 4]);
}

#[test]
fn test_set_stream_swaps_within_the_device() {
    let runtime = Runtime::host();
    let mut ctx = runtime.create_context().unwrap();
    assert!(!ctx.stream().unwrap().is_default());

    ctx.set_stream(runtime.default_stream(0).unwrap()).unwrap();
    assert!(ctx.stream().unwrap().is_default());
}

#[test]
fn test_set_stream_rejects_other_devices() {
    let runtime = Runtime::with_backend(Arc::new(HostBackend::with_layout(2, 1 << 20)));
    let mut ctx = runtime.create_context().unwrap();

    let err = ctx.set_stream(runtime.get_or_create_stream(1).unwrap()).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
    assert!(matches!(err, Error::StreamAffinity { .. }));
}

#[test]
fn test_context_creation_checks_the_ordinal() {
    let runtime = Runtime::host();
    let err = runtime.create_context_with(ContextOptions { device: 9, stream: None }).unwrap_err();
    assert!(matches!(err, Error::InvalidOrdinal { ordinal: 9, count: 1 }));
}

#[test]
fn test_reset_resource_falls_back_to_the_direct_path() {
    let runtime = Runtime::host();
    let pool = runtime.install_pool(0, 4096, 8192).unwrap();
    let ctx = runtime.create_context().unwrap();
    assert_eq!(ctx.resource().unwrap().kind(), ResourceKind::Pool);

    runtime.reset_resource(&pool).unwrap();
    drop(pool);

    // The captured resource is gone; allocations take the direct path.
    assert_eq!(ctx.resource().unwrap().kind(), ResourceKind::Direct);
    let buffer = DeviceBuffer::from_slice(&ctx, &[1.0f64; 8]).unwrap();
    assert_eq!(buffer.to_vec::<f64>().unwrap(), vec![1.0f64; 8]);
}
