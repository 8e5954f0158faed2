//! Built-in function metadata.
//!
//! Function tokens identify a function by its BIFF index. Fixed-arity
//! functions are written as tFunc (argument count implied), the others as
//! tFuncVar with an explicit count.

use phf::phf_map;

/// Static description of one built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub index: u16,
    pub name: &'static str,
    pub min_args: u8,
    pub max_args: u8,
}

impl FunctionMetadata {
    const fn new(index: u16, name: &'static str, min_args: u8, max_args: u8) -> Self {
        Self {
            index,
            name,
            min_args,
            max_args,
        }
    }

    /// Whether the argument count is implied by the function.
    pub fn has_fixed_args(&self) -> bool {
        self.min_args == self.max_args
    }
}

/// Index of IF.
pub const FUNCTION_INDEX_IF: u16 = 1;
/// Index of SUM.
pub const FUNCTION_INDEX_SUM: u16 = 4;
/// Index of CHOOSE.
pub const FUNCTION_INDEX_CHOOSE: u16 = 100;
/// Index used for add-in and user-defined functions.
pub const FUNCTION_INDEX_EXTERNAL: u16 = 255;

const VAR: u8 = 30;

static FUNCTIONS_BY_INDEX: phf::Map<u16, FunctionMetadata> = phf_map! {
    0u16 => FunctionMetadata::new(0, "COUNT", 0, VAR),
    1u16 => FunctionMetadata::new(1, "IF", 2, 3),
    2u16 => FunctionMetadata::new(2, "ISNA", 1, 1),
    3u16 => FunctionMetadata::new(3, "ISERROR", 1, 1),
    4u16 => FunctionMetadata::new(4, "SUM", 0, VAR),
    5u16 => FunctionMetadata::new(5, "AVERAGE", 1, VAR),
    6u16 => FunctionMetadata::new(6, "MIN", 1, VAR),
    7u16 => FunctionMetadata::new(7, "MAX", 1, VAR),
    8u16 => FunctionMetadata::new(8, "ROW", 0, 1),
    9u16 => FunctionMetadata::new(9, "COLUMN", 0, 1),
    10u16 => FunctionMetadata::new(10, "NA", 0, 0),
    12u16 => FunctionMetadata::new(12, "STDEV", 1, VAR),
    15u16 => FunctionMetadata::new(15, "SIN", 1, 1),
    16u16 => FunctionMetadata::new(16, "COS", 1, 1),
    17u16 => FunctionMetadata::new(17, "TAN", 1, 1),
    19u16 => FunctionMetadata::new(19, "PI", 0, 0),
    20u16 => FunctionMetadata::new(20, "SQRT", 1, 1),
    21u16 => FunctionMetadata::new(21, "EXP", 1, 1),
    22u16 => FunctionMetadata::new(22, "LN", 1, 1),
    23u16 => FunctionMetadata::new(23, "LOG10", 1, 1),
    24u16 => FunctionMetadata::new(24, "ABS", 1, 1),
    25u16 => FunctionMetadata::new(25, "INT", 1, 1),
    26u16 => FunctionMetadata::new(26, "SIGN", 1, 1),
    27u16 => FunctionMetadata::new(27, "ROUND", 2, 2),
    28u16 => FunctionMetadata::new(28, "LOOKUP", 2, 3),
    29u16 => FunctionMetadata::new(29, "INDEX", 2, 4),
    30u16 => FunctionMetadata::new(30, "REPT", 2, 2),
    31u16 => FunctionMetadata::new(31, "MID", 3, 3),
    32u16 => FunctionMetadata::new(32, "LEN", 1, 1),
    33u16 => FunctionMetadata::new(33, "VALUE", 1, 1),
    34u16 => FunctionMetadata::new(34, "TRUE", 0, 0),
    35u16 => FunctionMetadata::new(35, "FALSE", 0, 0),
    36u16 => FunctionMetadata::new(36, "AND", 1, VAR),
    37u16 => FunctionMetadata::new(37, "OR", 1, VAR),
    38u16 => FunctionMetadata::new(38, "NOT", 1, 1),
    39u16 => FunctionMetadata::new(39, "MOD", 2, 2),
    48u16 => FunctionMetadata::new(48, "TEXT", 2, 2),
    63u16 => FunctionMetadata::new(63, "RAND", 0, 0),
    65u16 => FunctionMetadata::new(65, "DATE", 3, 3),
    74u16 => FunctionMetadata::new(74, "NOW", 0, 0),
    76u16 => FunctionMetadata::new(76, "ROWS", 1, 1),
    77u16 => FunctionMetadata::new(77, "COLUMNS", 1, 1),
    100u16 => FunctionMetadata::new(100, "CHOOSE", 2, VAR),
    101u16 => FunctionMetadata::new(101, "HLOOKUP", 3, 4),
    102u16 => FunctionMetadata::new(102, "VLOOKUP", 3, 4),
    109u16 => FunctionMetadata::new(109, "LOG", 1, 2),
    111u16 => FunctionMetadata::new(111, "CHAR", 1, 1),
    112u16 => FunctionMetadata::new(112, "LOWER", 1, 1),
    113u16 => FunctionMetadata::new(113, "UPPER", 1, 1),
    114u16 => FunctionMetadata::new(114, "PROPER", 1, 1),
    115u16 => FunctionMetadata::new(115, "LEFT", 1, 2),
    116u16 => FunctionMetadata::new(116, "RIGHT", 1, 2),
    117u16 => FunctionMetadata::new(117, "EXACT", 2, 2),
    118u16 => FunctionMetadata::new(118, "TRIM", 1, 1),
    124u16 => FunctionMetadata::new(124, "FIND", 2, 3),
    126u16 => FunctionMetadata::new(126, "ISERR", 1, 1),
    127u16 => FunctionMetadata::new(127, "ISTEXT", 1, 1),
    128u16 => FunctionMetadata::new(128, "ISNUMBER", 1, 1),
    129u16 => FunctionMetadata::new(129, "ISBLANK", 1, 1),
    169u16 => FunctionMetadata::new(169, "COUNTA", 0, VAR),
    183u16 => FunctionMetadata::new(183, "PRODUCT", 0, VAR),
    190u16 => FunctionMetadata::new(190, "ISNONTEXT", 1, 1),
    198u16 => FunctionMetadata::new(198, "ISLOGICAL", 1, 1),
    212u16 => FunctionMetadata::new(212, "ROUNDUP", 2, 2),
    213u16 => FunctionMetadata::new(213, "ROUNDDOWN", 2, 2),
    221u16 => FunctionMetadata::new(221, "TODAY", 0, 0),
    255u16 => FunctionMetadata::new(255, "#external#", 1, VAR),
    336u16 => FunctionMetadata::new(336, "CONCATENATE", 0, VAR),
    337u16 => FunctionMetadata::new(337, "POWER", 2, 2),
    345u16 => FunctionMetadata::new(345, "SUMIF", 2, 3),
    346u16 => FunctionMetadata::new(346, "COUNTIF", 2, 2),
    347u16 => FunctionMetadata::new(347, "COUNTBLANK", 1, 1),
};

static FUNCTION_INDEX_BY_NAME: phf::Map<&'static str, u16> = phf_map! {
    "COUNT" => 0u16,
    "IF" => 1u16,
    "ISNA" => 2u16,
    "ISERROR" => 3u16,
    "SUM" => 4u16,
    "AVERAGE" => 5u16,
    "MIN" => 6u16,
    "MAX" => 7u16,
    "ROW" => 8u16,
    "COLUMN" => 9u16,
    "NA" => 10u16,
    "STDEV" => 12u16,
    "SIN" => 15u16,
    "COS" => 16u16,
    "TAN" => 17u16,
    "PI" => 19u16,
    "SQRT" => 20u16,
    "EXP" => 21u16,
    "LN" => 22u16,
    "LOG10" => 23u16,
    "ABS" => 24u16,
    "INT" => 25u16,
    "SIGN" => 26u16,
    "ROUND" => 27u16,
    "LOOKUP" => 28u16,
    "INDEX" => 29u16,
    "REPT" => 30u16,
    "MID" => 31u16,
    "LEN" => 32u16,
    "VALUE" => 33u16,
    "TRUE" => 34u16,
    "FALSE" => 35u16,
    "AND" => 36u16,
    "OR" => 37u16,
    "NOT" => 38u16,
    "MOD" => 39u16,
    "TEXT" => 48u16,
    "RAND" => 63u16,
    "DATE" => 65u16,
    "NOW" => 74u16,
    "ROWS" => 76u16,
    "COLUMNS" => 77u16,
    "CHOOSE" => 100u16,
    "HLOOKUP" => 101u16,
    "VLOOKUP" => 102u16,
    "LOG" => 109u16,
    "CHAR" => 111u16,
    "LOWER" => 112u16,
    "UPPER" => 113u16,
    "PROPER" => 114u16,
    "LEFT" => 115u16,
    "RIGHT" => 116u16,
    "EXACT" => 117u16,
    "TRIM" => 118u16,
    "FIND" => 124u16,
    "ISERR" => 126u16,
    "ISTEXT" => 127u16,
    "ISNUMBER" => 128u16,
    "ISBLANK" => 129u16,
    "COUNTA" => 169u16,
    "PRODUCT" => 183u16,
    "ISNONTEXT" => 190u16,
    "ISLOGICAL" => 198u16,
    "ROUNDUP" => 212u16,
    "ROUNDDOWN" => 213u16,
    "TODAY" => 221u16,
    "CONCATENATE" => 336u16,
    "POWER" => 337u16,
    "SUMIF" => 345u16,
    "COUNTIF" => 346u16,
    "COUNTBLANK" => 347u16,
};

/// Look up a function by its BIFF index.
pub fn function_by_index(index: u16) -> Option<&'static FunctionMetadata> {
    FUNCTIONS_BY_INDEX.get(&index)
}

/// Look up a function by name (case-insensitive).
pub fn function_by_name(name: &str) -> Option<&'static FunctionMetadata> {
    let upper = name.to_ascii_uppercase();
    FUNCTION_INDEX_BY_NAME
        .get(upper.as_str())
        .and_then(|index| FUNCTIONS_BY_INDEX.get(index))
}

/// Volatile functions are recalculated on every evaluation.
pub fn is_volatile(index: u16) -> bool {
    matches!(index, 63 | 74 | 221)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        let sum = function_by_name("sum").unwrap();
        assert_eq!(sum.index, FUNCTION_INDEX_SUM);
        assert!(!sum.has_fixed_args());
        assert_eq!(function_by_index(346).unwrap().name, "COUNTIF");
        assert!(function_by_name("NOSUCHFUNCTION").is_none());
    }

    #[test]
    fn test_name_table_matches_index_table() {
        for (name, index) in FUNCTION_INDEX_BY_NAME.entries() {
            let meta = function_by_index(*index).unwrap();
            assert_eq!(meta.name, *name);
        }
    }

    #[test]
    fn test_fixed_arity() {
        assert!(function_by_name("ROUND").unwrap().has_fixed_args());
        assert!(function_by_name("PI").unwrap().has_fixed_args());
        assert!(!function_by_name("LEFT").unwrap().has_fixed_args());
    }
}
