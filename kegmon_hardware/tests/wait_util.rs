use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::thread;
use std::time::Duration;

use kegmon_hardware::error::HwError;
use kegmon_hardware::util::{retry_on_timeout, sign_extend_24, wait_until_low_with_timeout};
use rstest::rstest;

#[test]
fn wait_until_low_success_path() {
    let high = Arc::new(AtomicBool::new(true));
    let high_bg = high.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        high_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_until_low_with_timeout(
        || high.load(Ordering::Relaxed),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn wait_until_low_timeout_path() {
    let err = wait_until_low_with_timeout(
        || true,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    assert!(matches!(err, HwError::DataReadyTimeout), "unexpected error: {err:?}");
}

#[rstest]
#[case(0x00_0000, 0)]
#[case(0x00_0001, 1)]
#[case(0x7F_FFFF, 8_388_607)]
#[case(0x80_0000, -8_388_608)]
#[case(0xFF_FFFF, -1)]
fn sign_extension_of_24_bit_counts(#[case] raw: u32, #[case] expected: i32) {
    assert_eq!(sign_extend_24(raw), expected);
}

#[test]
fn retry_gives_up_after_limit() {
    let calls = AtomicU32::new(0);
    let res: Result<i32, HwError> = retry_on_timeout(3, || {
        calls.fetch_add(1, Ordering::Relaxed);
        Err(HwError::Timeout)
    });
    assert!(matches!(res, Err(HwError::Timeout)));
    assert_eq!(calls.load(Ordering::Relaxed), 4);
}

#[test]
fn retry_does_not_retry_other_errors() {
    let calls = AtomicU32::new(0);
    let res: Result<i32, HwError> = retry_on_timeout(3, || {
        calls.fetch_add(1, Ordering::Relaxed);
        Err(HwError::Checksum)
    });
    assert!(matches!(res, Err(HwError::Checksum)));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn retry_recovers_after_transient_timeout() {
    let calls = AtomicU32::new(0);
    let res = retry_on_timeout(3, || {
        if calls.fetch_add(1, Ordering::Relaxed) == 0 {
            Err(HwError::DataReadyTimeout)
        } else {
            Ok(42)
        }
    });
    assert_eq!(res.unwrap(), 42);
}
