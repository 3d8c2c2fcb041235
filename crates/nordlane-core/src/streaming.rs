// ── Streaming-optimized server table ──
//
// The directory has no streaming category. Servers known to unblock
// regional streaming catalogues are listed here as inclusive ranges of
// identifier numbers per country prefix.

type Ranges = &'static [(u32, u32)];

const US: Ranges = &[
    (585, 592), (603, 604), (609, 617), (625, 632), (645, 680), (690, 690), (707, 710),
    (722, 737), (777, 780), (797, 804), (833, 843), (872, 879), (896, 903), (908, 919),
    (936, 939), (972, 987), (1016, 1020), (1033, 1041), (1046, 1049), (1054, 1086),
    (1102, 1130), (1138, 1141), (1150, 1157), (1162, 1195), (1236, 1239), (1248, 1255),
    (1260, 1279), (1284, 1287), (1297, 1312), (1322, 1341), (1346, 1357), (1362, 1365),
    (1370, 1373), (1418, 1421), (1426, 1429), (1442, 1457), (1470, 1479), (1484, 1495),
    (1500, 1515), (1520, 1539), (1560, 1599), (1604, 1607), (1612, 1671), (1676, 1691),
    (1696, 1707), (1709, 1737), (1742, 1745), (1750, 1793), (1798, 1801), (1806, 2029),
    (2034, 2045), (2048, 2139), (2144, 2203), (2216, 2223), (2228, 2392), (2396, 2411),
    (2428, 2451), (2460, 2488), (2509, 2524), (2533, 2536), (2545, 2548), (2561, 2564),
    (2573, 2600), (2609, 2616), (2621, 2632), (2642, 2645), (2674, 2677), (2686, 2705),
    (2710, 2721), (2730, 2749), (2758, 2765), (2778, 2789), (2794, 2805), (2810, 2825),
    (2834, 2843), (2848, 2851), (2853, 2853), (2862, 2870), (2872, 2872), (2877, 2893),
    (2895, 2895), (2897, 2899), (2951, 2953),
];

const CA: Ranges = &[
    (18, 21), (27, 30), (37, 40), (49, 56), (61, 64), (69, 76), (81, 90), (103, 104),
    (117, 124), (149, 343), (367, 453), (456, 457), (461, 462),
];

const NL: Ranges = &[
    (21, 24), (39, 42), (44, 47), (52, 67), (156, 264), (269, 287), (292, 331), (360, 360),
    (373, 373), (375, 377), (382, 387),
];

const JP: Ranges = &[(15, 16), (26, 29), (67, 69), (71, 74), (115, 126), (175, 175), (181, 181)];

const UK: Ranges = &[
    (69, 72), (89, 89), (154, 156), (178, 181), (195, 199), (228, 231), (264, 275), (280, 283),
    (300, 303), (336, 339), (344, 347), (372, 375), (380, 383), (393, 400), (417, 420),
    (425, 428), (433, 436), (457, 460), (465, 468), (484, 487), (496, 496), (565, 568),
    (593, 596), (609, 612), (617, 620), (637, 640), (649, 656), (673, 676), (701, 708),
    (725, 728), (765, 766),
];

const GR: Ranges = &[(3, 3)];

const MX: Ranges = &[(3, 9), (11, 11)];

fn ranges_for(prefix: &str) -> Option<Ranges> {
    match prefix {
        "us" => Some(US),
        "ca" => Some(CA),
        "nl" => Some(NL),
        "jp" => Some(JP),
        "uk" => Some(UK),
        "gr" => Some(GR),
        "mx" => Some(MX),
        _ => None,
    }
}

/// Country prefixes that have a streaming table.
pub fn countries() -> [&'static str; 7] {
    ["us", "ca", "nl", "jp", "uk", "gr", "mx"]
}

/// Whether a server identifier such as `us1602` is in the streaming table.
///
/// Identifiers with anything other than letters followed by digits
/// (double-hop `us-ca5`, for example) never match.
pub fn is_streaming(identifier: &str) -> bool {
    let split = identifier
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(identifier.len());
    let (prefix, digits) = identifier.split_at(split);
    let Ok(number) = digits.parse::<u32>() else {
        return false;
    };
    ranges_for(&prefix.to_ascii_lowercase())
        .is_some_and(|ranges| ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&number)))
}
