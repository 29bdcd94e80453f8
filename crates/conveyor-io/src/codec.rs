//! ASCII panel protocol.
//!
//! Digital panels answer `$016\r` with a 5-byte frame: `>`, a two hex digit
//! input mask, and a two byte trailer. The analogue panel answers `#01\r`
//! with `>` followed by eight 7-byte channel fields, each a sign and six
//! digits with two implied decimals (`+012345` is 123.45). Outputs are
//! switched one channel at a time with `#011C0V\r`; no response is sent.

use conveyor_spine::hal::round2;
use conveyor_spine::{
    AnalogueReading, BeaconColour, CellError, ConveyorCommand, DigitalInputs, Result,
};
use std::ops::Range;

pub const READ_DIGITAL: &[u8] = b"$016\r";
pub const READ_ANALOGUE: &[u8] = b"#01\r";

pub const DIGITAL_FRAME_LEN: usize = 5;
pub const ANALOGUE_FRAME_LEN: usize = 57;

const FRAME_MARKER: u8 = b'>';
const DIGITAL_PAYLOAD: Range<usize> = 1..3;
const CHANNEL_WIDTH: usize = 7;

/// Output channel of the conveyor contactor on the enable/fault panel.
pub const CONVEYOR_CHANNEL: u8 = 0;

struct Channel {
    name: &'static str,
    index: usize,
    scale: f64,
}

const SUPPLY_VOLTAGE: Channel = Channel {
    name: "supply_voltage",
    index: 0,
    scale: 3.0,
};
const SUPPLY_CURRENT: Channel = Channel {
    name: "supply_current",
    index: 1,
    scale: 0.5,
};
const MOTOR_TEMPERATURE: Channel = Channel {
    name: "motor_temperature",
    index: 2,
    scale: 10.0,
};
const MOTOR_VIBRATION: Channel = Channel {
    name: "motor_vibration",
    index: 3,
    scale: 10.0,
};

fn check_len(frame: &[u8], expected: usize) -> Result<()> {
    if frame.len() != expected {
        return Err(CellError::UnexpectedFrameLength {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

fn check_marker(frame: &[u8]) -> Result<()> {
    match frame.first() {
        Some(&FRAME_MARKER) => Ok(()),
        other => Err(CellError::MalformedFrame(format!(
            "expected '>' marker, got {:?}",
            other.map(|b| *b as char)
        ))),
    }
}

fn payload_mask(frame: &[u8]) -> Result<u8> {
    let payload = frame.get(DIGITAL_PAYLOAD).ok_or_else(|| {
        CellError::MalformedFrame(format!("frame of {} bytes has no payload", frame.len()))
    })?;
    if !payload.iter().all(u8::is_ascii_hexdigit) {
        return Err(CellError::MalformedFrame(format!(
            "payload {:?} is not hexadecimal",
            String::from_utf8_lossy(payload)
        )));
    }
    // Checked above: two ASCII hex digits.
    let text = std::str::from_utf8(payload).map_err(|e| CellError::MalformedFrame(e.to_string()))?;
    u8::from_str_radix(text, 16).map_err(|e| CellError::MalformedFrame(e.to_string()))
}

/// Tests bit `position` of the frame's hex payload.
pub fn bit_set(frame: &[u8], position: u32) -> Result<bool> {
    let mask = payload_mask(frame)?;
    Ok(DigitalInputs::from_bits(mask).bit(position))
}

pub fn decode_digital_panel(frame: &[u8]) -> Result<DigitalInputs> {
    check_len(frame, DIGITAL_FRAME_LEN)?;
    check_marker(frame)?;
    payload_mask(frame).map(DigitalInputs::from_bits)
}

pub fn decode_analogue_panel(frame: &[u8]) -> Result<AnalogueReading> {
    check_len(frame, ANALOGUE_FRAME_LEN)?;
    check_marker(frame)?;
    Ok(AnalogueReading {
        supply_voltage: decode_channel(frame, &SUPPLY_VOLTAGE)?,
        supply_current: decode_channel(frame, &SUPPLY_CURRENT)?,
        motor_temperature: decode_channel(frame, &MOTOR_TEMPERATURE)?,
        motor_vibration: decode_channel(frame, &MOTOR_VIBRATION)?,
    })
}

fn decode_channel(frame: &[u8], channel: &Channel) -> Result<f64> {
    let start = 1 + channel.index * CHANNEL_WIDTH;
    let field = &frame[start..start + CHANNEL_WIDTH];
    let parse_err = || CellError::NumericParseError {
        channel: channel.name,
        raw: String::from_utf8_lossy(field).into_owned(),
    };

    let (sign, digits) = field.split_first().ok_or_else(parse_err)?;
    if !matches!(*sign, b'+' | b'-') || !digits.iter().all(u8::is_ascii_digit) {
        return Err(parse_err());
    }
    let text = std::str::from_utf8(field).map_err(|_| parse_err())?;
    let raw: f64 = text.parse().map_err(|_| parse_err())?;
    Ok(round2(raw / 100.0 * channel.scale))
}

fn beacon_channel(colour: BeaconColour) -> u8 {
    match colour {
        BeaconColour::Red => 0,
        BeaconColour::Amber => 1,
        BeaconColour::Green => 2,
    }
}

/// Single-channel digital output write.
pub fn encode_output(channel: u8, on: bool) -> Vec<u8> {
    format!("#011{}0{}\r", channel, on as u8).into_bytes()
}

/// Two offs for the other colours, then the on for `colour`. Only the last
/// command lights anything, so two colours are never lit together.
pub fn encode_beacon_sequence(colour: BeaconColour) -> [Vec<u8>; 3] {
    let (first_off, second_off) = match colour {
        BeaconColour::Red => (BeaconColour::Amber, BeaconColour::Green),
        BeaconColour::Amber => (BeaconColour::Red, BeaconColour::Green),
        BeaconColour::Green => (BeaconColour::Red, BeaconColour::Amber),
    };
    [
        encode_output(beacon_channel(first_off), false),
        encode_output(beacon_channel(second_off), false),
        encode_output(beacon_channel(colour), true),
    ]
}

pub fn encode_conveyor_command(command: ConveyorCommand) -> Vec<u8> {
    encode_output(CONVEYOR_CHANNEL, command == ConveyorCommand::Run)
}


#[cfg(test)]
mod proptest_codec {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn digital_bits_match_mask(mask in any::<u8>(), position in 0u32..8) {
            let frame = format!(">{:02X}\r\n", mask);
            let inputs = decode_digital_panel(frame.as_bytes()).unwrap();
            prop_assert_eq!(inputs.bit(position), (mask >> position) & 1 == 1);
            prop_assert_eq!(bit_set(frame.as_bytes(), position).unwrap(), inputs.bit(position));
        }

        #[test]
        fn wrong_lengths_never_decode(frame in proptest::collection::vec(any::<u8>(), 0..80)) {
            if frame.len() != DIGITAL_FRAME_LEN {
                let is_len_err = matches!(
                    decode_digital_panel(&frame),
                    Err(CellError::UnexpectedFrameLength { .. })
                );
                prop_assert!(is_len_err);
            }
            if frame.len() != ANALOGUE_FRAME_LEN {
                let is_len_err = matches!(
                    decode_analogue_panel(&frame),
                    Err(CellError::UnexpectedFrameLength { .. })
                );
                prop_assert!(is_len_err);
            }
        }
    }
}
