//! TypeScript definitions for the types the rendering layer consumes.

use crate::align::{Anchor, MatchProgress};
use crate::document::{AnnotatedDocument, Block, RunKind, SegmentTag, TextRun};
use crate::matching::MatchSummary;
use crate::segment::Segment;
use crate::store::{Bookmark, CacheState, DocumentRecord};
use crate::tracker::{Effect, TrackerState};
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use tracing::info;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<()> {
    T::export_all_to(out_dir).map_err(|err| anyhow!("exporting {}: {err}", T::name()))
}

/// Replace every `.ts` file in `out_dir` with freshly generated bindings.
pub fn export_ts_bindings(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for entry in
        fs::read_dir(out_dir).with_context(|| format!("Failed to list {}", out_dir.display()))?
    {
        let path = entry.context("Failed to read entry")?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }

    export_single_type::<Segment>(out_dir)?;
    export_single_type::<SegmentTag>(out_dir)?;
    export_single_type::<RunKind>(out_dir)?;
    export_single_type::<TextRun>(out_dir)?;
    export_single_type::<Block>(out_dir)?;
    export_single_type::<AnnotatedDocument>(out_dir)?;
    export_single_type::<Anchor>(out_dir)?;
    export_single_type::<MatchProgress>(out_dir)?;
    export_single_type::<MatchSummary>(out_dir)?;
    export_single_type::<CacheState>(out_dir)?;
    export_single_type::<Bookmark>(out_dir)?;
    export_single_type::<DocumentRecord>(out_dir)?;
    export_single_type::<Effect>(out_dir)?;
    export_single_type::<TrackerState>(out_dir)?;

    info!(dir = %out_dir.display(), "Exported TypeScript bindings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn exports_boundary_types_and_drops_stale_files() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("sync-core-bindings-{nonce}"));
        fs::create_dir_all(&dir).expect("temp dir should be creatable");
        fs::write(dir.join("Stale.ts"), "export type Stale = never;").expect("stale file");

        export_ts_bindings(&dir).expect("bindings should export");

        assert!(!dir.join("Stale.ts").exists());
        assert!(dir.join("Block.ts").exists());
        assert!(dir.join("Effect.ts").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
