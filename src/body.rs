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

//! External collaborator: random filler text for produced message bodies.
//! No protocol logic depends on body content, only its fixed width.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

const PRINTABLE_ASCII_LO: u8 = 0x20;
const PRINTABLE_ASCII_HI: u8 = 0x7e;

/// Generates `len` bytes of printable ASCII, suitable for a message body of
/// exactly `BODY_LEN` bytes.
pub fn random_ascii<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let range = Uniform::from(PRINTABLE_ASCII_LO..=PRINTABLE_ASCII_HI);

    (0..len)
        .map(|_| range.sample(rng) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn produces_exact_length_printable_ascii() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let body = random_ascii(&mut rng, 256);

        assert_eq!(body.len(), 256);
        assert!(body.bytes().all(|b| (PRINTABLE_ASCII_LO..=PRINTABLE_ASCII_HI).contains(&b)));
    }
}
