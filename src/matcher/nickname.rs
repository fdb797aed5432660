//! Given-name alias table for the `NICKNAME` predicate.

use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// Canonical name first, then its common short forms.
const BUILTIN_GROUPS: &[&[&str]] = &[
    &["abigail", "abby", "gail"],
    &["alexander", "alex", "al", "sandy", "xander"],
    &["alexandra", "alex", "sandra", "sandy", "lexi"],
    &["albert", "al", "bert", "bertie"],
    &["alfred", "al", "alf", "fred", "freddie"],
    &["allan", "alan", "al"],
    &["andrew", "andy", "drew"],
    &["anthony", "tony"],
    &["barbara", "barb", "babs"],
    &["benjamin", "ben", "benny", "benji"],
    &["catherine", "cathy", "cat", "kate", "katie"],
    &["katherine", "kathy", "kate", "katie", "kat", "kay"],
    &["charles", "charlie", "chuck", "chas"],
    &["christopher", "chris", "kit", "topher"],
    &["christine", "chris", "chrissy", "tina"],
    &["daniel", "dan", "danny"],
    &["david", "dave", "davey"],
    &["deborah", "debbie", "deb"],
    &["donald", "don", "donnie"],
    &["dorothy", "dot", "dottie", "dolly"],
    &["edward", "ed", "eddie", "ted", "ned"],
    &["elizabeth", "liz", "beth", "betty", "betsy", "eliza", "lisa", "libby"],
    &["frances", "fran", "fanny", "frankie"],
    &["francis", "frank", "fran"],
    &["frederick", "fred", "freddie", "fritz"],
    &["gregory", "greg"],
    &["henry", "hank", "harry", "hal"],
    &["harold", "harry", "hal"],
    &["james", "jim", "jimmy", "jamie"],
    &["jennifer", "jen", "jenny"],
    &["jeffrey", "jeff"],
    &["john", "jack", "johnny", "jon"],
    &["jonathan", "jon", "john", "nathan"],
    &["joseph", "joe", "joey"],
    &["joshua", "josh"],
    &["kenneth", "ken", "kenny"],
    &["lawrence", "larry", "laurie"],
    &["margaret", "maggie", "meg", "peggy", "marge", "greta", "madge"],
    &["mary", "molly", "polly", "mae", "mamie"],
    &["matthew", "matt", "matty"],
    &["michael", "mike", "mikey", "mick", "mickey"],
    &["nicholas", "nick", "nicky", "klaus"],
    &["patricia", "pat", "patty", "trish", "tricia"],
    &["patrick", "pat", "paddy", "rick"],
    &["peter", "pete"],
    &["philip", "phil"],
    &["raymond", "ray"],
    &["rebecca", "becky", "becca"],
    &["richard", "rick", "ricky", "dick", "rich"],
    &["robert", "bob", "bobby", "rob", "robbie", "bert"],
    &["ronald", "ron", "ronnie"],
    &["samuel", "sam", "sammy"],
    &["samantha", "sam", "sammy"],
    &["stephen", "steve", "stevie"],
    &["steven", "steve", "stevie"],
    &["susan", "sue", "susie", "suzy"],
    &["theodore", "ted", "teddy", "theo"],
    &["thomas", "tom", "tommy"],
    &["timothy", "tim", "timmy"],
    &["victoria", "vicky", "tori"],
    &["walter", "walt", "wally"],
    &["william", "bill", "billy", "will", "willie", "liam"],
];

/// Symmetric, case-insensitive alias lookup built from name groups.
///
/// Two distinct names are aliases when some group contains both.
#[derive(Debug, Clone, Default)]
pub struct NicknameTable {
    groups: FxHashMap<String, Vec<usize>>,
    group_count: usize,
}

impl NicknameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared built-in table.
    pub fn builtin() -> &'static NicknameTable {
        static BUILTIN: OnceLock<NicknameTable> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut table = NicknameTable::new();
            for group in BUILTIN_GROUPS {
                table.insert_group(group.iter().copied());
            }
            table
        })
    }

    pub fn insert_group<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let group = self.group_count;
        self.group_count += 1;
        for name in names {
            let key = normalize(name);
            if key.is_empty() {
                continue;
            }
            let entry = self.groups.entry(key).or_default();
            if !entry.contains(&group) {
                entry.push(group);
            }
        }
    }

    pub fn insert_pair(&mut self, name: &str, alias: &str) {
        self.insert_group([name, alias]);
    }

    pub fn are_aliases(&self, s: &str, t: &str) -> bool {
        let s = normalize(s);
        let t = normalize(t);
        if s == t {
            return false;
        }
        match (self.groups.get(&s), self.groups.get(&t)) {
            (Some(left), Some(right)) => left.iter().any(|group| right.contains(group)),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.group_count
    }

    pub fn is_empty(&self) -> bool {
        self.group_count == 0
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
