//! English stopword table used by the content processor.
//!
//! Function words plus generic, high-frequency content words that show up on
//! almost every page of a site and carry no topical signal.

pub const STOPWORDS: &[&str] = &[
    // articles, conjunctions, prepositions
    "the", "and", "but", "nor", "yet", "for", "from", "with", "without", "within", "into",
    "about", "above", "below", "over", "under", "between", "among", "through", "during",
    "before", "after", "since", "until", "against", "along", "across", "around", "behind",
    "beyond", "near", "off", "out", "down", "via", "per", "than", "then", "though", "although",
    "because", "unless", "whether", "while", "else",
    // pronouns and determiners
    "our", "you", "your", "yours", "him", "his", "she", "her", "its", "they", "them", "their",
    "this", "that", "these", "those", "who", "whom", "whose", "which", "what", "each", "every",
    "either", "neither", "some", "any", "all", "both", "few", "many", "much", "more", "most",
    "less", "least", "other", "others", "another", "such", "same", "own", "several", "none",
    "nothing", "something", "anything", "everything", "someone", "anyone", "everyone",
    // auxiliaries and common verbs
    "are", "was", "were", "been", "being", "have", "has", "had", "having", "does", "did",
    "will", "would", "should", "can", "could", "may", "might", "must", "need", "get", "got",
    "getting", "make", "take", "give", "come", "say", "see", "know", "let", "put", "keep",
    "keeps", "kept", "seem", "want", "use", "find", "found", "look", "think", "try",
    // adverbs and qualifiers
    "not", "yes", "very", "too", "also", "just", "only", "even", "still", "already", "again",
    "ever", "never", "always", "often", "sometimes", "usually", "really", "quite", "rather",
    "almost", "enough", "here", "there", "where", "when", "why", "how", "now", "well",
    "however", "therefore", "perhaps", "maybe", "instead", "otherwise", "anyway", "likely",
    "away", "back", "together", "ago", "soon", "later", "today",
    // contraction fragments left behind after punctuation stripping
    "don", "doesn", "didn", "isn", "aren", "wasn", "weren", "hasn", "haven", "hadn", "won",
    "wouldn", "shouldn", "couldn", "cannot",
    // numbers spelled out and ordinals
    "one", "two", "first", "second", "third", "last", "next", "once",
    // generic site and content words
    "new", "like", "way", "thing", "things", "lot", "kind", "sort", "part", "time", "times",
    "day", "days", "year", "years", "good", "great", "best", "better", "big", "small", "little",
    "long", "high", "low", "right", "left", "sure", "able", "website", "site", "page", "pages",
    "post", "posts", "blog", "article", "articles", "comment", "comments", "click", "link",
    "links", "read", "share", "follow", "subscribe", "home", "menu", "view", "contact",
    "privacy", "policy", "terms", "copyright", "reserved", "rights", "email", "online",
    "please", "thanks", "thank", "help", "etc", "okay",
];
