// Epidemic messaging node - decentralized delay-tolerant message propagation over TCP.
// Copyright (C) 2021  rumblefrog
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Fixed-width ASCII on-wire representation of a [`Message`]. Fields are
//! joined by `_` in order: sender, recipient, created_at, body, transmitted,
//! transmitted_devices, transmitted_to_recipient. The total record length
//! (`SER_LEN`) is a function of the directory size and is known to both
//! peers by configuration.

use nom::bytes::complete::{tag, take};
use nom::sequence::terminated;
use nom::IResult;

use crate::identity::{Aem, AEM_WIDTH};
use crate::message::Message;

/// Zero-padded decimal width of `created_at` (covers the full `u64` range).
pub const CREATED_AT_WIDTH: usize = 20;

/// Total on-wire record length for a directory of `dir_len` peers and a
/// body width of `body_len` bytes.
pub fn ser_len(body_len: usize, dir_len: usize) -> usize {
    AEM_WIDTH + 1 // sender_
        + AEM_WIDTH + 1 // recipient_
        + CREATED_AT_WIDTH + 1 // created_at_
        + body_len + 1 // body_
        + 1 + 1 // transmitted_
        + dir_len + 1 // transmitted_devices_
        + 1 // transmitted_to_recipient
}

pub fn serialize(message: &Message, body_len: usize, dir_len: usize) -> Vec<u8> {
    let body = pad_body(&message.body, body_len);
    let devices = bitmap_string(&message.transmitted_devices, dir_len);

    format!(
        "{:0aw$}_{:0aw$}_{:0cw$}_{}_{}_{}_{}",
        message.sender.0,
        message.recipient.0,
        message.created_at,
        body,
        if message.transmitted { '1' } else { '0' },
        devices,
        if message.transmitted_to_recipient { '1' } else { '0' },
        aw = AEM_WIDTH,
        cw = CREATED_AT_WIDTH,
    )
    .into_bytes()
}

fn pad_body(body: &str, body_len: usize) -> String {
    if body.len() >= body_len {
        body[..body_len].to_string()
    } else {
        format!("{:<width$}", body, width = body_len)
    }
}

fn bitmap_string(bits: &[bool], dir_len: usize) -> String {
    let mut s: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();

    if s.len() < dir_len {
        s.extend(std::iter::repeat('0').take(dir_len - s.len()));
    } else {
        s.truncate(dir_len);
    }

    s
}

/// Parses a wire record of the exact width `ser_len(body_len, dir_len)`.
/// Rejects short input without advancing state, per the Receiver
/// sub-protocol's "discard short reads" rule.
pub fn parse<'a>(
    input: &'a [u8],
    body_len: usize,
    dir_len: usize,
) -> IResult<&'a [u8], Message> {
    let (input, sender) = decimal_field(input, AEM_WIDTH)?;
    let (input, recipient) = decimal_field(input, AEM_WIDTH)?;
    let (input, created_at) = decimal_field_u64(input, CREATED_AT_WIDTH)?;
    let (input, body_bytes) = terminated(take(body_len), tag(b"_"))(input)?;
    let (input, transmitted_bytes) = terminated(take(1usize), tag(b"_"))(input)?;
    let (input, devices_bytes) = terminated(take(dir_len), tag(b"_"))(input)?;
    let (input, to_recipient_bytes) = take(1usize)(input)?;

    let body = String::from_utf8_lossy(body_bytes).into_owned();
    let transmitted_devices: Vec<bool> = devices_bytes.iter().map(|&b| b == b'1').collect();

    Ok((
        input,
        Message {
            sender: Aem(sender),
            recipient: Aem(recipient),
            created_at,
            body,
            transmitted: transmitted_bytes == [b'1'],
            transmitted_devices,
            transmitted_to_recipient: to_recipient_bytes == [b'1'],
        },
    ))
}

fn decimal_field(input: &[u8], width: usize) -> IResult<&[u8], u32> {
    let (input, digits) = terminated(take(width), tag(b"_"))(input)?;

    let value = parse_u32(digits).map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(digits, nom::error::ErrorKind::Digit))
    })?;

    Ok((input, value))
}

fn decimal_field_u64(input: &[u8], width: usize) -> IResult<&[u8], u64> {
    let (input, digits) = terminated(take(width), tag(b"_"))(input)?;

    let value = parse_u64(digits).map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(digits, nom::error::ErrorKind::Digit))
    })?;

    Ok((input, value))
}

fn parse_u32(digits: &[u8]) -> Result<u32, std::num::ParseIntError> {
    std::str::from_utf8(digits)
        .unwrap_or("0")
        .parse::<u32>()
}

fn parse_u64(digits: &[u8]) -> Result<u64, std::num::ParseIntError> {
    std::str::from_utf8(digits)
        .unwrap_or("0")
        .parse::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let body_len = 8;
        let dir_len = 3;

        let mut m = Message::new(Aem(9990), Aem(9991), 1_700_000_000, "hi".into(), dir_len);
        m.mark_transmitted_to(0);
        m.transmitted = true;

        let wire = serialize(&m, body_len, dir_len);
        assert_eq!(wire.len(), ser_len(body_len, dir_len));

        let (rest, parsed) = parse(&wire, body_len, dir_len).unwrap();

        assert!(rest.is_empty());
        assert_eq!(parsed.sender, m.sender);
        assert_eq!(parsed.recipient, m.recipient);
        assert_eq!(parsed.created_at, m.created_at);
        assert_eq!(parsed.body, "hi      ");
        assert_eq!(parsed.transmitted, true);
        assert_eq!(parsed.transmitted_devices, vec![true, false, false]);
        assert_eq!(parsed.transmitted_to_recipient, false);
    }

    #[test]
    fn rejects_short_input() {
        let body_len = 8;
        let dir_len = 3;

        let short = b"0009";

        assert!(parse(short, body_len, dir_len).is_err());
    }
}
