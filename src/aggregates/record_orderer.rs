//! Where optional sheet components go when they are added to an
//! existing sheet.
//!
//! A sheet keeps its records in file order. Aggregates are represented by
//! placeholders so that their neighbours can be found without flattening.

use crate::records::{Record, sid};

/// One slot of a sheet's ordered record list.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetItem {
    Record(Record),
    Rows,
    MergedCells,
    ConditionalFormats,
    DataValidity,
    PageSettings,
    ColumnInfos,
}

impl SheetItem {
    /// Sid of a plain record slot.
    pub fn sid(&self) -> Option<u16> {
        match self {
            SheetItem::Record(r) => Some(r.sid()),
            _ => None,
        }
    }

    pub fn is_sid(&self, expected: u16) -> bool {
        self.sid() == Some(expected)
    }
}

/// Components whose position is decided by [`find_insert_position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetComponent {
    MergedCells,
    ConditionalFormatting,
    DataValidity,
    PageSettings,
    Guts,
    Gridset,
    Protect,
    ScenarioProtect,
    ObjectProtect,
    Password,
    Pane,
    ColumnInfos,
}

const VIEW_RECORDS: &[u16] = &[
    sid::WINDOW2,
    sid::SCL,
    sid::PANE,
    sid::SELECTION,
    sid::STANDARDWIDTH,
    sid::LABELRANGES,
    sid::PHONETICPR,
];

/// Records that open a worksheet, up to and including GRIDSET.
const CALC_PROLOGUE: &[u16] = &[
    sid::BOF,
    sid::INDEX,
    sid::UNCALCED,
    sid::CALCMODE,
    sid::CALCCOUNT,
    sid::REFMODE,
    sid::ITERATION,
    sid::DELTA,
    sid::SAVERECALC,
    sid::PRINTHEADERS,
    sid::PRINTGRIDLINES,
    sid::GRIDSET,
];

/// Everything that may precede the page settings block.
const PAGE_PROLOGUE: &[u16] = &[
    sid::BOF,
    sid::INDEX,
    sid::UNCALCED,
    sid::CALCMODE,
    sid::CALCCOUNT,
    sid::REFMODE,
    sid::ITERATION,
    sid::DELTA,
    sid::SAVERECALC,
    sid::PRINTHEADERS,
    sid::PRINTGRIDLINES,
    sid::GRIDSET,
    sid::GUTS,
    sid::DEFAULTROWHEIGHT,
    sid::WSBOOL,
];

fn last_of(items: &[SheetItem], sids: &[u16]) -> Option<usize> {
    items
        .iter()
        .rposition(|item| item.sid().is_some_and(|s| sids.contains(&s)))
}

fn position_of(items: &[SheetItem], pred: impl Fn(&SheetItem) -> bool) -> Option<usize> {
    items.iter().position(pred)
}

fn before_eof(items: &[SheetItem]) -> usize {
    items
        .iter()
        .rposition(|item| item.is_sid(sid::EOF))
        .unwrap_or(items.len())
}

/// Slot in front of DIMENSIONS, or in front of the rows when it is
/// missing.
fn before_dimensions(items: &[SheetItem]) -> usize {
    position_of(items, |i| i.is_sid(sid::DIMENSIONS))
        .or_else(|| position_of(items, |i| *i == SheetItem::Rows))
        .unwrap_or_else(|| before_eof(items))
}

fn after_view_records(items: &[SheetItem]) -> usize {
    last_of(items, VIEW_RECORDS).map_or_else(|| before_eof(items), |i| i + 1)
}

/// Index at which `component` must be inserted into `items`.
pub fn find_insert_position(items: &[SheetItem], component: SheetComponent) -> usize {
    let after = |pred: &dyn Fn(&SheetItem) -> bool| position_of(items, pred).map(|i| i + 1);
    match component {
        SheetComponent::MergedCells => after_view_records(items),
        SheetComponent::ConditionalFormatting => after(&|i| *i == SheetItem::MergedCells)
            .unwrap_or_else(|| after_view_records(items)),
        SheetComponent::DataValidity => after(&|i| *i == SheetItem::ConditionalFormats)
            .or_else(|| after(&|i| *i == SheetItem::MergedCells))
            .or_else(|| last_of(items, VIEW_RECORDS).map(|i| i + 1))
            .unwrap_or_else(|| before_eof(items)),
        SheetComponent::PageSettings => {
            let limit = before_dimensions(items);
            last_of(&items[..limit], PAGE_PROLOGUE).map_or(limit, |i| i + 1)
        },
        SheetComponent::Guts => {
            let limit = before_dimensions(items);
            last_of(&items[..limit], CALC_PROLOGUE).map_or(limit, |i| i + 1)
        },
        SheetComponent::Gridset => after(&|i| i.is_sid(sid::PRINTGRIDLINES))
            .or_else(|| after(&|i| i.is_sid(sid::PRINTHEADERS)))
            .unwrap_or_else(|| before_dimensions(items)),
        SheetComponent::Protect => position_of(items, |i| i.is_sid(sid::DEFCOLWIDTH))
            .or_else(|| position_of(items, |i| *i == SheetItem::ColumnInfos))
            .unwrap_or_else(|| before_dimensions(items)),
        SheetComponent::ScenarioProtect => after(&|i| i.is_sid(sid::PROTECT))
            .unwrap_or_else(|| find_insert_position(items, SheetComponent::Protect)),
        SheetComponent::ObjectProtect => after(&|i| i.is_sid(sid::SCENPROTECT))
            .or_else(|| after(&|i| i.is_sid(sid::PROTECT)))
            .unwrap_or_else(|| find_insert_position(items, SheetComponent::Protect)),
        SheetComponent::Password => after(&|i| i.is_sid(sid::OBJPROTECT))
            .or_else(|| after(&|i| i.is_sid(sid::SCENPROTECT)))
            .or_else(|| after(&|i| i.is_sid(sid::PROTECT)))
            .unwrap_or_else(|| find_insert_position(items, SheetComponent::Protect)),
        SheetComponent::Pane => {
            after(&|i| i.is_sid(sid::WINDOW2)).unwrap_or_else(|| after_view_records(items))
        },
        SheetComponent::ColumnInfos => before_dimensions(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        BofRecord, BofType, DefaultColWidthRecord, DimensionsRecord, EofRecord, GridsetRecord,
        PrintGridlinesRecord, ProtectRecord, SelectionRecord, WindowTwoRecord, WsBoolRecord,
    };

    fn rec(r: impl Into<Record>) -> SheetItem {
        SheetItem::Record(r.into())
    }

    fn sample() -> Vec<SheetItem> {
        vec![
            rec(BofRecord::new(BofType::Worksheet)),
            rec(PrintGridlinesRecord::default()),
            rec(GridsetRecord { gridset: 1 }),
            rec(WsBoolRecord { options: 0x04C1 }),
            SheetItem::PageSettings,
            rec(DefaultColWidthRecord { width: 8 }),
            rec(DimensionsRecord::new(0, 0, 0, 0)),
            SheetItem::Rows,
            rec(WindowTwoRecord::default()),
            rec(SelectionRecord::default()),
            SheetItem::MergedCells,
            rec(EofRecord),
        ]
    }

    #[test]
    fn test_view_anchored_components() {
        let items = sample();
        assert_eq!(find_insert_position(&items, SheetComponent::Pane), 9);
        assert_eq!(
            find_insert_position(&items, SheetComponent::ConditionalFormatting),
            11
        );
        assert_eq!(find_insert_position(&items, SheetComponent::DataValidity), 11);
    }

    #[test]
    fn test_prologue_anchored_components() {
        let items = sample();
        assert_eq!(find_insert_position(&items, SheetComponent::Guts), 3);
        assert_eq!(find_insert_position(&items, SheetComponent::Gridset), 2);
        assert_eq!(find_insert_position(&items, SheetComponent::Protect), 5);
        assert_eq!(find_insert_position(&items, SheetComponent::ColumnInfos), 6);
    }

    #[test]
    fn test_protection_chain() {
        let mut items = sample();
        items.insert(5, rec(ProtectRecord::new(true)));
        assert_eq!(find_insert_position(&items, SheetComponent::ScenarioProtect), 6);
        assert_eq!(find_insert_position(&items, SheetComponent::ObjectProtect), 6);
        assert_eq!(find_insert_position(&items, SheetComponent::Password), 6);
    }

    #[test]
    fn test_merged_cells_without_view_records() {
        let items = vec![rec(BofRecord::new(BofType::Worksheet)), rec(EofRecord)];
        assert_eq!(find_insert_position(&items, SheetComponent::MergedCells), 1);
        assert_eq!(find_insert_position(&items, SheetComponent::PageSettings), 1);
    }
}
