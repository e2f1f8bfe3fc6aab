#![allow(missing_docs)]
//! Host-level tests for the parameter block, its checksum, and the storage backends.

use axis_servo::Error;
use axis_servo::params::{ControllerParameters, PARAMETER_BLOCK_SIZE, checksum};
use axis_servo::store::{
    FileStorage, MemoryStorage, ParameterStorage, ParameterStore, QuiescedStorage,
};

fn tuned() -> ControllerParameters {
    ControllerParameters {
        pgain: 2.5,
        igain: 0.125,
        dgain: -0.75,
        ff0gain: 1e-3,
        ff1gain: 42.0,
        max_output: 1500.0,
        deadband: 3.0,
        max_error: 800.0,
        max_error_i: 10.0,
        max_error_d: 20.0,
        max_command_d: 30.0,
        multiplier: 7,
        ticks_per_servo_cycle: 40,
        checksum: 0,
    }
}

#[test]
fn defaults_match_the_safe_configuration() {
    let defaults = ControllerParameters::default();
    assert_eq!(0.005, defaults.pgain);
    assert_eq!(0.0, defaults.igain);
    assert_eq!(1000.0, defaults.max_error);
    assert_eq!(2000.0, defaults.max_output);
    assert_eq!(1, defaults.multiplier);
    assert_eq!(1, defaults.ticks_per_servo_cycle);
}

#[test]
fn save_then_load_round_trips_every_field() {
    let mut store = ParameterStore::new(MemoryStorage::new());
    let mut parameters = tuned();
    store.save(&mut parameters).expect("save");
    assert_ne!(0, parameters.checksum);

    let loaded = store.load().expect("load");
    assert_eq!(parameters, loaded);
}

#[test]
fn valid_block_sums_to_zero() {
    let block = tuned().to_block();
    assert_eq!(0, checksum(&block));
}

#[test]
fn any_single_byte_corruption_is_detected() {
    let mut parameters = tuned();
    let block = parameters.to_block();
    for index in 0..PARAMETER_BLOCK_SIZE {
        for flip in [0x01u8, 0x80, 0xFF] {
            let mut corrupted = block;
            corrupted[index] ^= flip;
            let mut store = ParameterStore::new(MemoryStorage::with_block(corrupted));
            assert!(
                matches!(store.load(), Err(Error::ChecksumMismatch { .. })),
                "byte {index} flipped by {flip:#04x} went unnoticed"
            );
        }
    }
}

#[test]
fn mismatch_reports_stored_checksum() {
    let mut parameters = tuned();
    let mut block = parameters.to_block();
    block[0] ^= 0x10;
    let mut store = ParameterStore::new(MemoryStorage::with_block(block));
    let Err(Error::ChecksumMismatch { stored, computed }) = store.load() else {
        panic!("expected a checksum mismatch");
    };
    assert_eq!(parameters.checksum, stored);
    assert_ne!(stored, computed);
}

#[test]
fn empty_storage_reports_no_parameters() {
    let mut store = ParameterStore::new(MemoryStorage::new());
    assert_eq!(Err(Error::NoStoredParameters), store.load());
}

#[test]
fn out_of_range_fields_are_rejected_despite_valid_checksum() {
    let mut parameters = ControllerParameters {
        multiplier: 50,
        ..tuned()
    };
    let block = parameters.to_block();
    let mut store = ParameterStore::new(MemoryStorage::with_block(block));
    assert_eq!(Err(Error::ParameterOutOfRange), store.load());

    let mut parameters = ControllerParameters {
        ticks_per_servo_cycle: 0,
        ..tuned()
    };
    let block = parameters.to_block();
    let mut store = ParameterStore::new(MemoryStorage::with_block(block));
    assert_eq!(Err(Error::ParameterOutOfRange), store.load());
}

#[test]
fn integer_settings_truncate_then_clamp() {
    let mut parameters = ControllerParameters::DEFAULT;
    parameters.set_multiplier(50.0);
    assert_eq!(22, parameters.multiplier);
    parameters.set_multiplier(0.0);
    assert_eq!(1, parameters.multiplier);
    parameters.set_multiplier(7.9);
    assert_eq!(7, parameters.multiplier);
    parameters.set_multiplier(-3.0);
    assert_eq!(1, parameters.multiplier);

    parameters.set_ticks_per_servo_cycle(500.0);
    assert_eq!(100, parameters.ticks_per_servo_cycle);
    parameters.set_ticks_per_servo_cycle(0.0);
    assert_eq!(1, parameters.ticks_per_servo_cycle);
    parameters.set_ticks_per_servo_cycle(12.5);
    assert_eq!(12, parameters.ticks_per_servo_cycle);
}

#[test]
fn file_storage_round_trips_and_replaces_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("servo.params");

    let mut store = ParameterStore::new(FileStorage::new(&path));
    assert_eq!(Err(Error::NoStoredParameters), store.load());

    let mut first = tuned();
    store.save(&mut first).expect("save");
    let mut second = ControllerParameters {
        pgain: 9.0,
        ..tuned()
    };
    store.save(&mut second).expect("save");

    assert_eq!(second, store.load().expect("load"));
    assert_eq!(
        PARAMETER_BLOCK_SIZE as u64,
        std::fs::metadata(&path).expect("metadata").len()
    );
    let leftovers = std::fs::read_dir(dir.path()).expect("read_dir").count();
    assert_eq!(1, leftovers);
}

#[test]
fn file_storage_rejects_truncated_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("servo.params");
    std::fs::write(&path, [0u8; 10]).expect("write");

    let mut storage = FileStorage::new(&path);
    let mut block = [0; PARAMETER_BLOCK_SIZE];
    assert_eq!(Err(Error::StorageCorrupted), storage.read_block(&mut block));
}

#[test]
fn quiesced_storage_runs_its_hook_before_each_write_only() {
    let mut hook_calls = 0;
    let mut store = ParameterStore::new(QuiescedStorage::new(MemoryStorage::new(), || {
        hook_calls += 1;
    }));
    let mut parameters = tuned();
    store.save(&mut parameters).expect("save");
    assert_eq!(Ok(tuned().pgain), store.load().map(|loaded| loaded.pgain));
    assert!(store.storage().inner().block().is_some());
    drop(store);
    assert_eq!(1, hook_calls);
}
