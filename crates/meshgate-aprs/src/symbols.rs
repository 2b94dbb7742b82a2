//! Map-symbol lookup for two-letter icon codes
//!
//! Icons are written the way the APRS "tocall" symbol index writes them: two
//! letters naming a symbol (`MV` is a car, `OG` a gateway), optionally
//! followed by an overlay character. The lookup yields the two-byte
//! table/code pair placed into position reports.

/// Symbol used for device positions when no icon is registered (car)
pub const DEFAULT_POSITION_SYMBOL: &str = "/>";

/// Characters accepted as an overlay on overlay-capable symbols
const OVERLAYS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One entry of the symbol index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// Two-letter icon code
    pub code: &'static str,
    /// Symbol table character followed by the symbol code character
    pub symbol: &'static str,
    /// Human-readable name
    pub description: &'static str,
    /// Whether the table character may be replaced by an overlay
    pub overlay: bool,
}

const fn sym(
    code: &'static str,
    symbol: &'static str,
    description: &'static str,
    overlay: bool,
) -> Symbol {
    Symbol {
        code,
        symbol,
        description,
        overlay,
    }
}

/// Symbol index, sorted by code
static SYMBOLS: &[Symbol] = &[
    sym("A0", "\\0", "Circle, IRLP / Echolink/WIRES", true),
    sym("A8", "\\8", "802.11 WiFi or other network node", false),
    sym("A9", "\\9", "Gas station", false),
    sym("AA", "\\A", "White box", true),
    sym("AB", "\\B", "Blowing snow", false),
    sym("AC", "\\C", "Coast Guard", false),
    sym("AD", "\\D", "Drizzling rain", false),
    sym("AE", "\\E", "Smoke, Chimney", false),
    sym("AF", "\\F", "Freezing rain", false),
    sym("AG", "\\G", "Snow shower", false),
    sym("AH", "\\H", "Haze", false),
    sym("AI", "\\I", "Rain shower", false),
    sym("AJ", "\\J", "Lightning", false),
    sym("AK", "\\K", "Kenwood HT", false),
    sym("AL", "\\L", "Lighthouse", false),
    sym("AN", "\\N", "Navigation buoy", false),
    sym("AO", "\\O", "Rocket", false),
    sym("AP", "\\P", "Parking", false),
    sym("AQ", "\\Q", "Earthquake", false),
    sym("AR", "\\R", "Restaurant", false),
    sym("AS", "\\S", "Satellite", false),
    sym("AT", "\\T", "Thunderstorm", false),
    sym("AU", "\\U", "Sunny", false),
    sym("AV", "\\V", "VORTAC, Navigational aid", false),
    sym("AW", "\\W", "NWS site", true),
    sym("AX", "\\X", "Pharmacy", false),
    sym("BB", "/!", "Police station", false),
    sym("BD", "/#", "Digipeater", false),
    sym("BE", "/$", "Telephone", false),
    sym("BF", "/%", "DX cluster", false),
    sym("BG", "/&", "HF gateway", false),
    sym("BH", "/'", "Small aircraft", false),
    sym("BI", "/(", "Mobile satellite station", false),
    sym("BJ", "/)", "Wheelchair, handicapped", false),
    sym("BK", "/*", "Snowmobile", false),
    sym("BL", "/+", "Red Cross", false),
    sym("BM", "/,", "Boy Scouts", false),
    sym("BN", "/-", "House", false),
    sym("BO", "/.", "Red X", false),
    sym("BP", "//", "Red dot", false),
    sym("DS", "\\[", "Wall Cloud", false),
    sym("DV", "\\^", "Aircraft", true),
    sym("DW", "\\_", "Weather site", true),
    sym("DX", "\\`", "Rain", false),
    sym("HS", "/[", "Human", false),
    sym("HT", "/\\", "DF triangle", false),
    sym("HU", "/]", "Mailbox, post office", false),
    sym("HV", "/^", "Large aircraft", false),
    sym("HW", "/_", "Weather station", false),
    sym("HX", "/`", "Satellite dish antenna", false),
    sym("LA", "/a", "Ambulance", false),
    sym("LB", "/b", "Bicycle", false),
    sym("LC", "/c", "Incident command post", false),
    sym("LD", "/d", "Fire station", false),
    sym("LE", "/e", "Horse, equestrian", false),
    sym("LF", "/f", "Fire truck", false),
    sym("LG", "/g", "Glider", false),
    sym("LH", "/h", "Hospital", false),
    sym("LI", "/i", "IOTA, islands on the air", false),
    sym("LJ", "/j", "Jeep", false),
    sym("LK", "/k", "Truck", false),
    sym("LL", "/l", "Laptop", false),
    sym("LM", "/m", "Mic-E repeater", false),
    sym("LN", "/n", "Node, black bulls-eye", false),
    sym("LO", "/o", "Emergency operations center", false),
    sym("LP", "/p", "Dog", false),
    sym("LQ", "/q", "Grid square, 2 by 2", false),
    sym("LR", "/r", "Repeater tower", false),
    sym("LS", "/s", "Ship, power boat", false),
    sym("LT", "/t", "Truck stop", false),
    sym("LU", "/u", "Semi-trailer truck, 18-wheeler", false),
    sym("LV", "/v", "Van", false),
    sym("LW", "/w", "Water station", false),
    sym("LX", "/x", "X / Unix", false),
    sym("LY", "/y", "House, yagi antenna", false),
    sym("LZ", "/z", "Shelter", false),
    sym("MR", "/:", "Fire", false),
    sym("MS", "/;", "Campground, tent", false),
    sym("MT", "/<", "Motorcycle", false),
    sym("MU", "/=", "Railroad engine", false),
    sym("MV", "/>", "Car", false),
    sym("MW", "/?", "File server", false),
    sym("MX", "/@", "Hurricane predicted path", false),
    sym("NR", "\\:", "Hail", false),
    sym("NS", "\\;", "Park, picnic area", false),
    sym("NT", "\\<", "Advisory, single red flag", false),
    sym("NV", "\\>", "Red car", true),
    sym("NW", "\\?", "Info kiosk", false),
    sym("NX", "\\@", "Hurricane, Tropical storm", false),
    sym("OB", "\\!", "Emergency", false),
    sym("OD", "\\#", "Digipeater, green star", true),
    sym("OE", "\\$", "Bank or ATM", false),
    sym("OG", "\\&", "Gateway station", true),
    sym("OH", "\\'", "Crash / incident site", false),
    sym("OI", "\\(", "Cloudy", false),
    sym("OJ", "\\)", "Firenet MEO, MODIS Earth Observation", false),
    sym("OK", "\\*", "Snow", false),
    sym("OL", "\\+", "Church", false),
    sym("OM", "\\,", "Girl Scouts", false),
    sym("ON", "\\-", "House, HF antenna", false),
    sym("OO", "\\.", "Ambiguous, question mark inside circle", false),
    sym("OP", "\\/", "Waypoint destination", false),
    sym("P0", "/0", "Numbered circle: 0", false),
    sym("P1", "/1", "Numbered circle: 1", false),
    sym("P2", "/2", "Numbered circle: 2", false),
    sym("P3", "/3", "Numbered circle: 3", false),
    sym("P4", "/4", "Numbered circle: 4", false),
    sym("P5", "/5", "Numbered circle: 5", false),
    sym("P6", "/6", "Numbered circle: 6", false),
    sym("P7", "/7", "Numbered circle: 7", false),
    sym("P8", "/8", "Numbered circle: 8", false),
    sym("P9", "/9", "Numbered circle: 9", false),
    sym("PA", "/A", "Aid station", false),
    sym("PB", "/B", "BBS", false),
    sym("PC", "/C", "Canoe", false),
    sym("PE", "/E", "Eyeball", false),
    sym("PF", "/F", "Farm vehicle, tractor", false),
    sym("PG", "/G", "Grid square, 3 by 3", false),
    sym("PH", "/H", "Hotel", false),
    sym("PI", "/I", "TCP/IP network station", false),
    sym("PK", "/K", "School", false),
    sym("PL", "/L", "PC user", false),
    sym("PM", "/M", "Mac apple", false),
    sym("PN", "/N", "NTS station", false),
    sym("PO", "/O", "Balloon", false),
    sym("PP", "/P", "Police car", false),
    sym("PR", "/R", "Recreational vehicle", false),
    sym("PS", "/S", "Space Shuttle", false),
    sym("PT", "/T", "SSTV", false),
    sym("PU", "/U", "Bus", false),
    sym("PV", "/V", "ATV, Amateur Television", false),
    sym("PW", "/W", "Weather service site", false),
    sym("PX", "/X", "Helicopter", false),
    sym("PY", "/Y", "Sailboat", false),
    sym("PZ", "/Z", "Windows flag", false),
    sym("Q1", "\\{", "Fog", false),
    sym("SA", "\\a", "Red diamond", true),
    sym("SB", "\\b", "Blowing dust, sand", false),
    sym("SC", "\\c", "CD triangle, RACES, CERTS, SATERN", true),
    sym("SD", "\\d", "DX spot", false),
    sym("SE", "\\e", "Sleet", false),
    sym("SF", "\\f", "Funnel cloud", false),
    sym("SG", "\\g", "Gale, two red flags", false),
    sym("SH", "\\h", "Store", false),
    sym("SI", "\\i", "Black box, point of interest", true),
    sym("SJ", "\\j", "Work zone, excavating machine", false),
    sym("SK", "\\k", "SUV, ATV", false),
    sym("SM", "\\m", "Value sign, 3 digit display", false),
    sym("SN", "\\n", "Red triangle", true),
    sym("SO", "\\o", "Small circle", false),
    sym("SP", "\\p", "Partly cloudy", false),
    sym("SR", "\\r", "Restrooms", false),
    sym("SS", "\\s", "Ship, boat", true),
    sym("ST", "\\t", "Tornado", false),
    sym("SU", "\\u", "Truck", true),
    sym("SV", "\\v", "Van", true),
    sym("SW", "\\w", "Flooding", false),
    sym("SY", "\\y", "Skywarn", false),
    sym("SZ", "\\z", "Shelter", false),
];

/// Look up a symbol index entry by its two-letter code
pub fn lookup(code: &str) -> Option<&'static Symbol> {
    SYMBOLS
        .binary_search_by(|entry| entry.code.cmp(code))
        .ok()
        .map(|idx| &SYMBOLS[idx])
}

/// Convert an icon code (`MV`, `OGM`, ...) into a two-character symbol
///
/// Input is trimmed and upper-cased. A third character overlays the table
/// character when the entry supports overlays and the character is a valid
/// overlay; otherwise it is ignored. Unknown codes yield `None`.
pub fn symbol_code(icon: &str) -> Option<String> {
    let icon = icon.trim().to_uppercase();
    if !(2..=3).contains(&icon.chars().count()) || !icon.is_ascii() {
        return None;
    }

    let (code, overlay) = icon.split_at(2);
    let entry = lookup(code)?;

    match overlay.chars().next() {
        Some(c) if entry.overlay && OVERLAYS.contains(c) => {
            Some(format!("{}{}", c, &entry.symbol[1..]))
        }
        _ => Some(entry.symbol.to_string()),
    }
}
