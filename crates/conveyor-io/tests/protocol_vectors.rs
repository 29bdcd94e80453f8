use conveyor_io::codec::{
    decode_analogue_panel, decode_digital_panel, encode_beacon_sequence, ANALOGUE_FRAME_LEN,
};
use conveyor_spine::{BeaconColour, CellError};

// Captured from the analogue panel on the bench: 230.01 V, 4.2 A, 41.2 C,
// 1.5 vibration; channels 4..7 unwired.
const BENCH_ANALOGUE: &[u8] = b">+007667+000840+000412+000015+000000+000000+000000+000000";

#[test]
fn decodes_bench_analogue_frame() {
    assert_eq!(BENCH_ANALOGUE.len(), ANALOGUE_FRAME_LEN);
    let reading = decode_analogue_panel(BENCH_ANALOGUE).expect("bench frame should decode");
    assert_eq!(reading.supply_voltage, 230.01);
    assert_eq!(reading.supply_current, 4.2);
    assert_eq!(reading.motor_temperature, 41.2);
    assert_eq!(reading.motor_vibration, 1.5);
}

#[test]
fn decodes_enable_panel_with_faults() {
    // enable + current fault + vibration fault
    let inputs = decode_digital_panel(b">15\r\n").expect("frame should decode");
    assert!(inputs.bit(0));
    assert!(!inputs.bit(1));
    assert!(inputs.bit(2));
    assert!(!inputs.bit(3));
    assert!(inputs.bit(4));
}

#[test]
fn truncated_analogue_frame_is_rejected_before_decode() {
    let truncated = &BENCH_ANALOGUE[..ANALOGUE_FRAME_LEN - 1];
    match decode_analogue_panel(truncated) {
        Err(CellError::UnexpectedFrameLength { expected, actual }) => {
            assert_eq!(expected, 57);
            assert_eq!(actual, 56);
        }
        other => panic!("expected length error, got {:?}", other),
    }
}

#[test]
fn beacon_sequences_light_one_colour_last() {
    let green = encode_beacon_sequence(BeaconColour::Green);
    assert_eq!(green[0], b"#011000\r");
    assert_eq!(green[1], b"#011100\r");
    assert_eq!(green[2], b"#011201\r");
}
