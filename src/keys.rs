//! Key event encoding for driving interactive programs through a PTY.

use crossterm::event::{KeyCode, KeyModifiers};

const ESC: u8 = 0x1b;

/// Encode a key event as the byte sequence a terminal would send.
///
/// Returns `None` for keys with no conventional encoding.
pub fn key_bytes(key_code: KeyCode, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    let bytes = match key_code {
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => control_chord(c),
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::ALT) => {
            let mut bytes = vec![ESC];
            bytes.extend(c.to_string().into_bytes());
            bytes
        }
        KeyCode::Char(c) => c.to_string().into_bytes(),

        // CSI 13;2u for modified Enter
        KeyCode::Enter if modifiers.contains(KeyModifiers::SHIFT) => b"\x1b[13;2u".to_vec(),
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),

        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),

        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),

        KeyCode::F(n) => function_key(n)?,
        KeyCode::Esc => vec![ESC],

        _ => return None,
    };
    Some(bytes)
}

/// Ctrl+A = 0x01 ... Ctrl+Z = 0x1A, plus the punctuation chords.
fn control_chord(c: char) -> Vec<u8> {
    if c.is_ascii_alphabetic() {
        return vec![(c.to_ascii_lowercase() as u8) - b'a' + 1];
    }
    match c {
        '[' => vec![ESC],
        '\\' => vec![0x1c],
        ']' => vec![0x1d],
        '^' => vec![0x1e],
        '_' => vec![0x1f],
        _ => c.to_string().into_bytes(),
    }
}

fn function_key(n: u8) -> Option<Vec<u8>> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq.to_vec())
}
