//! Record type identifiers (sids) for the BIFF8 records this crate knows.

// Substream framing
pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CONTINUE: u16 = 0x003C;

// Workbook globals
pub const CODEPAGE: u16 = 0x0042;
pub const FILESHARING: u16 = 0x005B;
pub const BOUNDSHEET: u16 = 0x0085;
pub const SST: u16 = 0x00FC;
pub const EXTSST: u16 = 0x00FF;
pub const SUPBOOK: u16 = 0x01AE;
pub const EXTERNNAME: u16 = 0x0023;
pub const XCT: u16 = 0x0059;
pub const CRN: u16 = 0x005A;
pub const EXTERNSHEET: u16 = 0x0017;
pub const NAME: u16 = 0x0018;
pub const WINDOW1: u16 = 0x003D;
pub const FONT: u16 = 0x0031;
pub const XF: u16 = 0x00E0;
pub const STYLE: u16 = 0x0293;
pub const USESELFS: u16 = 0x0160;
pub const INTERFACEHDR: u16 = 0x00E1;
pub const INTERFACEEND: u16 = 0x00E2;
pub const WRITEACCESS: u16 = 0x005C;
pub const DSF: u16 = 0x0161;
pub const TABID: u16 = 0x013D;
pub const DATE1904: u16 = 0x0022;
pub const COUNTRY: u16 = 0x008C;
pub const FORMAT: u16 = 0x041E;

// Sheet prologue
pub const INDEX: u16 = 0x020B;
pub const UNCALCED: u16 = 0x005E;
pub const CALCMODE: u16 = 0x000D;
pub const CALCCOUNT: u16 = 0x000C;
pub const REFMODE: u16 = 0x000F;
pub const ITERATION: u16 = 0x0011;
pub const DELTA: u16 = 0x0010;
pub const SAVERECALC: u16 = 0x005F;
pub const PRINTHEADERS: u16 = 0x002A;
pub const PRINTGRIDLINES: u16 = 0x002B;
pub const GRIDSET: u16 = 0x0082;
pub const GUTS: u16 = 0x0080;
pub const DEFAULTROWHEIGHT: u16 = 0x0225;
pub const WSBOOL: u16 = 0x0081;

// Page settings block
pub const HORIZONTALPAGEBREAKS: u16 = 0x001B;
pub const VERTICALPAGEBREAKS: u16 = 0x001A;
pub const HEADER: u16 = 0x0014;
pub const FOOTER: u16 = 0x0015;
pub const HCENTER: u16 = 0x0083;
pub const VCENTER: u16 = 0x0084;
pub const LEFTMARGIN: u16 = 0x0026;
pub const RIGHTMARGIN: u16 = 0x0027;
pub const TOPMARGIN: u16 = 0x0028;
pub const BOTTOMMARGIN: u16 = 0x0029;
pub const PLS: u16 = 0x004D;
pub const SETUP: u16 = 0x00A1;
pub const BITMAP: u16 = 0x00E9;
pub const HEADERFOOTER: u16 = 0x089C;

// Protection
pub const PROTECT: u16 = 0x0012;
pub const SCENPROTECT: u16 = 0x00DD;
pub const OBJPROTECT: u16 = 0x0063;
pub const PASSWORD: u16 = 0x0013;

// Columns and dimensions
pub const DEFCOLWIDTH: u16 = 0x0055;
pub const COLINFO: u16 = 0x007D;
pub const DIMENSIONS: u16 = 0x0200;

// Row blocks
pub const ROW: u16 = 0x0208;
pub const DBCELL: u16 = 0x00D7;
pub const NUMBER: u16 = 0x0203;
pub const RK: u16 = 0x027E;
pub const MULRK: u16 = 0x00BD;
pub const LABEL: u16 = 0x0204;
pub const LABELSST: u16 = 0x00FD;
pub const BOOLERR: u16 = 0x0205;
pub const BLANK: u16 = 0x0201;
pub const MULBLANK: u16 = 0x00BE;
pub const FORMULA: u16 = 0x0006;
pub const STRING: u16 = 0x0207;
pub const SHRFMLA: u16 = 0x04BC;
pub const ARRAY: u16 = 0x0221;
pub const TABLE: u16 = 0x0236;

// View settings
pub const WINDOW2: u16 = 0x023E;
pub const SCL: u16 = 0x00A0;
pub const PANE: u16 = 0x0041;
pub const SELECTION: u16 = 0x001D;
pub const STANDARDWIDTH: u16 = 0x0099;
pub const MERGECELLS: u16 = 0x00E5;
pub const LABELRANGES: u16 = 0x015F;
pub const PHONETICPR: u16 = 0x00EF;

// Conditional formats and validations
pub const CFHEADER: u16 = 0x01B0;
pub const CFRULE: u16 = 0x01B1;
pub const DVAL: u16 = 0x01B2;
pub const DV: u16 = 0x01BE;
pub const HLINK: u16 = 0x01B8;
pub const FEAT: u16 = 0x0868;

/// Whether `sid` belongs to a cell value record that lives in a row block.
pub fn is_cell_value(sid: u16) -> bool {
    matches!(
        sid,
        NUMBER | RK | MULRK | LABEL | LABELSST | BOOLERR | BLANK | MULBLANK | FORMULA
    )
}

/// Whether `sid` can appear inside the row blocks of a worksheet.
pub fn is_row_block_record(sid: u16) -> bool {
    is_cell_value(sid) || matches!(sid, ROW | DBCELL | STRING | SHRFMLA | ARRAY | TABLE)
}

/// Whether `sid` is a component of the page settings block.
pub fn is_page_settings_component(sid: u16) -> bool {
    matches!(
        sid,
        HORIZONTALPAGEBREAKS
            | VERTICALPAGEBREAKS
            | HEADER
            | FOOTER
            | HCENTER
            | VCENTER
            | LEFTMARGIN
            | RIGHTMARGIN
            | TOPMARGIN
            | BOTTOMMARGIN
            | PLS
            | SETUP
            | BITMAP
            | HEADERFOOTER
    )
}

/// Human readable name for the record type, used in diagnostics.
pub fn name(sid: u16) -> &'static str {
    match sid {
        BOF => "BOF",
        EOF => "EOF",
        CONTINUE => "CONTINUE",
        CODEPAGE => "CODEPAGE",
        FILESHARING => "FILESHARING",
        BOUNDSHEET => "BOUNDSHEET",
        SST => "SST",
        EXTSST => "EXTSST",
        SUPBOOK => "SUPBOOK",
        EXTERNNAME => "EXTERNNAME",
        XCT => "XCT",
        CRN => "CRN",
        EXTERNSHEET => "EXTERNSHEET",
        NAME => "NAME",
        WINDOW1 => "WINDOW1",
        FONT => "FONT",
        XF => "XF",
        STYLE => "STYLE",
        FORMAT => "FORMAT",
        USESELFS => "USESELFS",
        DATE1904 => "DATE1904",
        COUNTRY => "COUNTRY",
        INDEX => "INDEX",
        UNCALCED => "UNCALCED",
        CALCMODE => "CALCMODE",
        CALCCOUNT => "CALCCOUNT",
        REFMODE => "REFMODE",
        ITERATION => "ITERATION",
        DELTA => "DELTA",
        SAVERECALC => "SAVERECALC",
        PRINTHEADERS => "PRINTHEADERS",
        PRINTGRIDLINES => "PRINTGRIDLINES",
        GRIDSET => "GRIDSET",
        GUTS => "GUTS",
        DEFAULTROWHEIGHT => "DEFAULTROWHEIGHT",
        WSBOOL => "WSBOOL",
        HORIZONTALPAGEBREAKS => "HORIZONTALPAGEBREAKS",
        VERTICALPAGEBREAKS => "VERTICALPAGEBREAKS",
        HEADER => "HEADER",
        FOOTER => "FOOTER",
        HCENTER => "HCENTER",
        VCENTER => "VCENTER",
        LEFTMARGIN => "LEFTMARGIN",
        RIGHTMARGIN => "RIGHTMARGIN",
        TOPMARGIN => "TOPMARGIN",
        BOTTOMMARGIN => "BOTTOMMARGIN",
        PLS => "PLS",
        SETUP => "SETUP",
        BITMAP => "BITMAP",
        PROTECT => "PROTECT",
        SCENPROTECT => "SCENPROTECT",
        OBJPROTECT => "OBJPROTECT",
        PASSWORD => "PASSWORD",
        DEFCOLWIDTH => "DEFCOLWIDTH",
        COLINFO => "COLINFO",
        DIMENSIONS => "DIMENSIONS",
        ROW => "ROW",
        DBCELL => "DBCELL",
        NUMBER => "NUMBER",
        RK => "RK",
        MULRK => "MULRK",
        LABEL => "LABEL",
        LABELSST => "LABELSST",
        BOOLERR => "BOOLERR",
        BLANK => "BLANK",
        MULBLANK => "MULBLANK",
        FORMULA => "FORMULA",
        STRING => "STRING",
        SHRFMLA => "SHRFMLA",
        ARRAY => "ARRAY",
        TABLE => "TABLE",
        WINDOW2 => "WINDOW2",
        SCL => "SCL",
        PANE => "PANE",
        SELECTION => "SELECTION",
        MERGECELLS => "MERGECELLS",
        CFHEADER => "CFHEADER",
        CFRULE => "CFRULE",
        DVAL => "DVAL",
        DV => "DV",
        _ => "UNKNOWN",
    }
}
