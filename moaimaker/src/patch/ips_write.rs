use anyhow::{ensure, Result};

const MAX_RECORD_LEN: usize = 0xFFFF;
const MAX_OFFSET: usize = 0xFFFFFF;
// A record starting here would be read back as the end-of-patch marker.
const EOF_OFFSET: usize = 0x454F46;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Chunk {
    start: usize,
    end: usize,
}

fn get_next_chunk(mut pos: usize, old: &[u8], new: &[u8]) -> Chunk {
    while pos < old.len() && old[pos] == new[pos] {
        pos += 1;
    }
    if pos == old.len() {
        return Chunk {
            start: pos,
            end: new.len(),
        };
    }
    let start = pos;
    while pos < old.len() && old[pos] != new[pos] {
        pos += 1;
    }
    if pos == old.len() {
        return Chunk {
            start,
            end: new.len(),
        };
    }
    Chunk { start, end: pos }
}

fn push_split_chunks(chunk_vec: &mut Vec<Chunk>, chunk: Chunk) {
    let mut start = chunk.start;
    if start == EOF_OFFSET {
        start -= 1;
    }
    while start + MAX_RECORD_LEN < chunk.end {
        chunk_vec.push(Chunk {
            start,
            end: start + MAX_RECORD_LEN,
        });
        start += MAX_RECORD_LEN;
        if start == EOF_OFFSET {
            start -= 1;
        }
    }
    chunk_vec.push(Chunk {
        start,
        end: chunk.end,
    });
}

fn get_chunks(old_rom: &[u8], new_rom: &[u8]) -> Vec<Chunk> {
    let mut pos = 0;
    let mut chunk_vec: Vec<Chunk> = Vec::new();
    loop {
        let chunk = get_next_chunk(pos, old_rom, new_rom);
        if chunk.start != chunk.end {
            push_split_chunks(&mut chunk_vec, chunk)
        }
        if chunk.end == new_rom.len() {
            return chunk_vec;
        }
        pos = chunk.end;
    }
}

/// IPS patch turning `old_rom` into `new_rom`. The new image may be longer
/// (an expanded image against its original); the extra bytes are appended.
pub fn create_ips_patch(old_rom: &[u8], new_rom: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        new_rom.len() >= old_rom.len(),
        "new image ({:#X} bytes) is shorter than the old one ({:#X} bytes)",
        new_rom.len(),
        old_rom.len()
    );
    ensure!(
        new_rom.len() <= MAX_OFFSET + 1,
        "image of {:#X} bytes is too large for IPS",
        new_rom.len()
    );
    let mut out: Vec<u8> = Vec::new();
    out.extend("PATCH".as_bytes());
    for chunk in get_chunks(old_rom, new_rom) {
        let size = chunk.end - chunk.start;
        out.extend(&chunk.start.to_be_bytes()[5..8]);
        out.extend(&size.to_be_bytes()[6..8]);
        out.extend(&new_rom[chunk.start..chunk.end]);
    }
    out.extend("EOF".as_bytes());
    Ok(out)
}
