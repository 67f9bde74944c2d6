use log::info;

use crate::cartridge::rom_image::RomImage;
use crate::mapper_list::MapperKind;

const MANBOW2_TAG: &[u8] = b"Mapper: Manbow 2";
// Z80 "LD (nn),A": how megaROM games write their bank registers.
const LD_NN_A: u8 = 0x32;

// Candidates in tie-break order: later entries win ties.
const CANDIDATES: [MapperKind; 4] = [
    MapperKind::KonamiScc,
    MapperKind::Konami4,
    MapperKind::Ascii8,
    MapperKind::Ascii16,
];
const KONAMI_SCC: usize = 0;
const KONAMI4: usize = 1;
const ASCII8: usize = 2;
const ASCII16: usize = 3;

// Identifies the mapper of an image that isn't in any database, by looking at where its code
// stores bytes. Returns None when the image offers no evidence at all.
pub fn guess_mapper_kind(image: &RomImage) -> Option<MapperKind> {
    let data = image.bytes();
    let size = data.len();
    if size == 0 {
        return None;
    }

    if size <= 0x10000 {
        if size == 0x10000 && !has_cartridge_header(data, 0x4000) {
            return Some(MapperKind::Ascii16);
        }

        return Some(MapperKind::PlainRom);
    }

    if data.windows(MANBOW2_TAG.len()).any(|window| window == MANBOW2_TAG) {
        return Some(MapperKind::Manbow2);
    }

    let scores = score_bank_writes(data);
    // The winner's index into CANDIDATES.
    let mut best: Option<usize> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score > 0 && best.is_none_or(|best| score >= scores[best]) {
            best = Some(index);
        }
    }

    let guess = best.map(|index| CANDIDATES[index]);
    info!("Guessed mapper {guess:?} for {} from bank write scores {scores:?}.", image.name());
    guess
}

fn has_cartridge_header(data: &[u8], offset: usize) -> bool {
    data.get(offset..offset + 2) == Some(b"AB")
}

// Scores each candidate by counting stores to the addresses its bank registers live at.
fn score_bank_writes(data: &[u8]) -> [u32; 4] {
    let mut scores = [0u32; 4];
    for window in data.windows(3) {
        if window[0] != LD_NN_A {
            continue;
        }

        match u16::from_le_bytes([window[1], window[2]]) {
            0x4000 | 0x8000 | 0xA000 => scores[KONAMI4] += 1,
            0x5000 | 0x9000 | 0xB000 => scores[KONAMI_SCC] += 1,
            0x6000 => {
                scores[KONAMI4] += 1;
                scores[ASCII8] += 1;
                scores[ASCII16] += 1;
            }
            0x6800 | 0x7800 => scores[ASCII8] += 1,
            0x7000 => {
                scores[KONAMI_SCC] += 1;
                scores[ASCII8] += 1;
                scores[ASCII16] += 1;
            }
            0x77FF => scores[ASCII16] += 1,
            _ => {}
        }
    }

    // ASCII8 shares too many addresses with the others to win on equal evidence.
    scores[ASCII8] = scores[ASCII8].saturating_sub(1);
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_stores(size: usize, targets: &[u16]) -> RomImage {
        let mut data = vec![0u8; size];
        for (i, target) in targets.iter().enumerate() {
            let [low, high] = target.to_le_bytes();
            data[0x100 + 4 * i..0x100 + 4 * i + 3].copy_from_slice(&[LD_NN_A, low, high]);
        }

        RomImage::from_bytes("guess", data)
    }

    #[test]
    fn small_images_are_plain() {
        let image = RomImage::from_bytes("small", vec![0; 0x8000]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::PlainRom));
    }

    #[test]
    fn headerless_64k_is_ascii16() {
        let image = RomImage::from_bytes("64k", vec![0; 0x10000]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::Ascii16));

        let mut data = vec![0; 0x10000];
        data[0x4000..0x4002].copy_from_slice(b"AB");
        assert_eq!(guess_mapper_kind(&RomImage::from_bytes("64k", data)), Some(MapperKind::PlainRom));
    }

    #[test]
    fn konami_scc_stores() {
        let image = image_with_stores(0x20000, &[0x5000, 0x7000, 0x9000, 0xB000]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::KonamiScc));
    }

    #[test]
    fn konami4_stores() {
        let image = image_with_stores(0x20000, &[0x6000, 0x8000, 0xA000]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::Konami4));
    }

    #[test]
    fn ascii8_stores() {
        let image = image_with_stores(0x20000, &[0x6000, 0x6800, 0x7000, 0x7800, 0x6800]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::Ascii8));
    }

    #[test]
    fn ascii16_stores() {
        let image = image_with_stores(0x20000, &[0x6000, 0x77FF]);
        assert_eq!(guess_mapper_kind(&image), Some(MapperKind::Ascii16));
    }

    #[test]
    fn manbow2_tag() {
        let mut data = vec![0u8; 0x80000];
        data[0x1234..0x1234 + MANBOW2_TAG.len()].copy_from_slice(MANBOW2_TAG);
        assert_eq!(guess_mapper_kind(&RomImage::from_bytes("mb2", data)), Some(MapperKind::Manbow2));
    }

    #[test]
    fn no_evidence() {
        let image = RomImage::from_bytes("blank", vec![0; 0x20000]);
        assert_eq!(guess_mapper_kind(&image), None);
    }
}
