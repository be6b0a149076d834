use wikiharvest::CanonicalOptions;

#[test]
fn canonicalization_round_trips() {
    let options = CanonicalOptions::default();
    let inputs = [
        "https://en.wikipedia.org/wiki/Singapore",
        "HTTPS://EN.Wikipedia.ORG/wiki/Singapore/",
        "https://en.wikipedia.org/wiki/Singapore#History",
        "https://en.wikipedia.org/w/index.php?title=X&action=history",
        "definitely not a url",
    ];
    for input in inputs {
        let once = options.canonicalize(input);
        assert_eq!(
            options.canonicalize(&once),
            once,
            "canon(canon(u)) must equal canon(u) for {input}"
        );
    }
}

#[test]
fn equivalent_urls_canonicalize_equal() {
    let options = CanonicalOptions::default();
    let canonical = options.canonicalize("https://en.wikipedia.org/wiki/Singapore");
    let variants = [
        "https://EN.WIKIPEDIA.ORG/wiki/Singapore",
        "https://en.wikipedia.org/wiki/Singapore/",
        "https://en.wikipedia.org/wiki/Singapore#Geography",
    ];
    for variant in variants {
        assert_eq!(
            options.canonicalize(variant),
            canonical,
            "{variant} should collapse to {canonical}"
        );
    }
}

#[test]
fn query_parameter_order_is_irrelevant() {
    let options = CanonicalOptions::default();
    assert_eq!(
        options.canonicalize("https://en.wikipedia.org/w/index.php?b=2&a=1"),
        options.canonicalize("https://en.wikipedia.org/w/index.php?a=1&b=2"),
    );
}

#[test]
fn toggles_disable_individual_rules() {
    let keep_fragment = CanonicalOptions {
        remove_fragments: false,
        ..CanonicalOptions::default()
    };
    assert!(keep_fragment
        .canonicalize("https://en.wikipedia.org/wiki/Singapore#History")
        .ends_with("#History"));

    let disabled = CanonicalOptions {
        normalize_urls: false,
        remove_fragments: true,
        sort_query_params: true,
    };
    let raw = "HTTPS://EN.wikipedia.org/wiki/Singapore/";
    assert_eq!(disabled.canonicalize(raw), raw);
}
