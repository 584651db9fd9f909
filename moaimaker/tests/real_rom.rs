use std::path::Path;
use std::process::Command;

use anyhow::Result;
use moaimaker::{LayoutStore, Rom};
use moaimaker_game::codec::to_logical;
use moaimaker_game::RomLayout;

/// Runs the CLI against the real cartridge image and checks that fixing and
/// expanding keep every level intact. Ignored by default because the image
/// cannot be distributed.
///
/// The test assumes the image is present at "roms/moaikun.nes" in the
/// repository root.
#[test]
#[ignore]
fn real_rom_fix_and_expand() -> Result<()> {
    let cli_path = env!("CARGO_BIN_EXE_moaimaker-cli");
    std::env::set_current_dir("..")?;
    let input = Path::new("roms/moaikun.nes");
    let tmp = std::env::temp_dir();
    let fixed_path = tmp.join("moaimaker_fixed.nes");
    let expanded_path = tmp.join("moaimaker_expanded.nes");

    let orig = LayoutStore::parse(Rom::load(input)?.data)?;
    assert_eq!(orig.layout(), RomLayout::Original);
    for level in orig.active_levels() {
        to_logical(level)?;
    }

    let status = Command::new(cli_path)
        .args(["--input-rom", "roms/moaikun.nes", "--output-rom"])
        .arg(&fixed_path)
        .arg("fix")
        .status()?;
    assert!(status.success());
    let status = Command::new(cli_path)
        .arg("--input-rom")
        .arg(&fixed_path)
        .arg("--output-rom")
        .arg(&expanded_path)
        .arg("expand")
        .status()?;
    assert!(status.success());

    for path in [&fixed_path, &expanded_path] {
        let store = LayoutStore::parse(Rom::load(path)?.data)?;
        assert_eq!(store.level_count(), orig.level_count());
        for (a, b) in orig.active_levels().iter().zip(store.active_levels()) {
            // Expanded slots drop trailing zero bytes, which decode the same.
            assert_eq!(to_logical(a)?, to_logical(b)?);
            assert_eq!(a.enemy_data(), b.enemy_data());
        }
    }
    Ok(())
}
