//! Additive mod-256 checksum.
//!
//! A frame `[LEN PAYLOAD... CS]` is valid when `CS == (LEN + sum(PAYLOAD)) mod 256`.

/// Sum of all bytes mod 256. An empty slice sums to zero.
pub fn compute(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// True when the trailing byte matches the checksum of everything before it.
///
/// Frames shorter than two bytes cannot carry a checksum and never validate.
pub fn validate(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&cs, body)) if !body.is_empty() => compute(body) == cs,
        _ => false,
    }
}

/// Overwrite the trailing byte with the checksum of everything before it.
///
/// No-op for frames shorter than two bytes.
pub fn update(frame: &mut [u8]) {
    if let Some((cs, body)) = frame.split_last_mut() {
        if !body.is_empty() {
            *cs = compute(body);
        }
    }
}

/// Append the checksum of `frame` to its end.
pub fn append(frame: &mut Vec<u8>) {
    let cs = compute(frame);
    frame.push(cs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example() {
        let mut frame = vec![0x01, 0x05];
        append(&mut frame);
        assert_eq!(frame, vec![0x01, 0x05, 0x06]);
        assert!(validate(&frame));
    }

    #[test]
    fn wraps_mod_256() {
        assert_eq!(compute(&[0xFF, 0x02]), 0x01);
        assert_eq!(compute(&[0x80, 0x80]), 0x00);
    }

    #[test]
    fn update_then_validate() {
        let bodies: [&[u8]; 3] = [&[0x00], &[0x02, 0x20, 0x22], &[0xFF; 57]];
        for body in bodies {
            let mut frame = body.to_vec();
            frame.push(0xAA);
            update(&mut frame);
            assert!(validate(&frame), "failed for {body:02X?}");
        }
    }

    #[test]
    fn corrupted_trailer_fails() {
        assert!(!validate(&[0x01, 0x05, 0x07]));
    }

    #[test]
    fn too_short_never_validates() {
        assert!(!validate(&[]));
        assert!(!validate(&[0x00]));

        let mut one = [0x42];
        update(&mut one);
        assert_eq!(one, [0x42]);
    }
}
