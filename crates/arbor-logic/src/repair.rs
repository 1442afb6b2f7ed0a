//! Rebuilding the catalog and the list-size cache from the field tables.

use tracing::info;

use arbor_engine::Engine;
use arbor_structure::CatalogEntry;

use crate::error::LogicResult;
use crate::Logic;

/// What a repair pass rebuilt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Empty field tables that were dropped.
    pub tables_dropped: usize,
    /// Catalog rows written.
    pub catalog_rows: usize,
    /// List-size cache entries written.
    pub list_sizes: usize,
}

impl<'e, E: Engine + ?Sized> Logic<'e, E> {
    /// Treat the field tables as the source of truth and rebuild the
    /// `_spec` catalog and `_listsizes` cache from them.
    pub fn repair(&self) -> LogicResult<RepairSummary> {
        let structure = &self.structure;
        let mut summary = RepairSummary::default();

        structure.clear_catalog()?;
        structure.clear_list_sizes()?;

        for table in structure.field_tables()? {
            if structure.drop_if_empty(&table.name)? {
                summary.tables_dropped += 1;
                continue;
            }
            for (id, refcount) in structure.table_row_counts(&table)? {
                structure.insert_catalog_entry(&CatalogEntry {
                    id,
                    path: table.path.clone(),
                    tag: table.tag,
                    refcount,
                })?;
                summary.catalog_rows += 1;
            }
            for level in 0..table.path.list_position_count() {
                for (id, list, index) in structure.table_list_indices(&table, level)? {
                    structure.update_list_size(id, &list, index)?;
                }
            }
        }

        summary.list_sizes = structure.list_sizes(None)?.len();
        info!(
            tables_dropped = summary.tables_dropped,
            catalog_rows = summary.catalog_rows,
            list_sizes = summary.list_sizes,
            "repair complete"
        );
        Ok(summary)
    }
}
