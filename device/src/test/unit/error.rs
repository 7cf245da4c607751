use strum::VariantArray;

use crate::element::ElementType;
use crate::error::{Error, Status};

#[test]
fn test_every_error_maps_to_one_status() {
    let cases = [
        (Error::InvalidOrdinal { ordinal: 3, count: 1 }, Status::InvalidArgument),
        (Error::InvalidResourceConfig { reason: "pool initial size must be nonzero".into() }, Status::InvalidArgument),
        (Error::StreamAffinity { stream_device: 1, handle_device: 0 }, Status::InvalidArgument),
        (
            Error::ElementMismatch { actual: ElementType::F32, requested: ElementType::I64 },
            Status::InvalidArgument,
        ),
        (Error::SizeMismatch { expected: 4, actual: 2 }, Status::InvalidArgument),
        (Error::ForeignDevice { resource_device: 0, request_device: 1 }, Status::InvalidArgument),
        (Error::OutOfDeviceMemory { requested: 1, available: 0, ordinal: 0 }, Status::AllocationFailure),
        (Error::PoolExhausted { requested: 1, reserved: 1, max_size: 1 }, Status::AllocationFailure),
        (Error::ArenaExhausted { requested: 1, remaining: 0, region_size: 1 }, Status::AllocationFailure),
        (Error::HandleFreed { handle: "device buffer" }, Status::HandleMisuse),
        (Error::ResourceBusy { outstanding: 2 }, Status::HandleMisuse),
        (Error::StreamCreation { ordinal: 0, reason: "driver refused".into() }, Status::RuntimeFailure),
        (Error::Backend { reason: "copy fault".into() }, Status::RuntimeFailure),
    ];
    for (error, status) in cases {
        assert_eq!(error.status(), status, "{error}");
    }
}

#[test]
fn test_status_codes_are_wire_stable() {
    assert_eq!(Status::InvalidArgument as i32, 1);
    assert_eq!(Status::AllocationFailure as i32, 2);
    assert_eq!(Status::HandleMisuse as i32, 3);
    assert_eq!(Status::RuntimeFailure as i32, 4);

    for status in Status::VARIANTS {
        assert_eq!(Status::from_repr(*status as i32), Some(*status));
    }
    assert_eq!(Status::from_repr(0), None);
    assert_eq!(Status::from_repr(5), None);
}

#[test]
fn test_display_names_the_failing_piece() {
    let err = Error::InvalidOrdinal { ordinal: 7, count: 2 };
    assert_eq!(err.to_string(), "invalid device ordinal 7: backend exposes 2 device(s)");

    let err = Error::HandleFreed { handle: "device buffer" };
    assert_eq!(err.to_string(), "device buffer used after free");
}
