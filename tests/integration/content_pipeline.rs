use wikiharvest::pages::ContentPipeline;

/// A messy article body exercising most of the excision rules.
fn messy_article() -> String {
    r#"<html><head><title>Singapore</title><script>alert(1)</script>
<style>.x { color: red }</style></head>
<body>
<nav><ul><li><a href="/wiki/Main_Page">Main page</a></li></ul></nav>
<h1 id="firstHeading">Singapore</h1>
<div id="mw-content-text"><div class="mw-parser-output">
<!-- hidden comment -->
<table class="infobox"><tr><td>Population: lots</td></tr></table>
<div class="hatnote">This article is about the city-state.</div>
<p>The city-state of <b>Singapore</b> is a sovereign island country in
Southeast Asia.[1] It is known for its <a href="/wiki/Port">port</a> and
cuisine.[2][citation needed]</p>
<span class="mw-editsection">[edit]</span>
<h2>History</h2>
<p>Early records describe the island as a trading post. Modern Singapore was
founded in 1819.[3][when?]</p>
<ul><li>First point</li><li>Second point</li></ul>
<div class="thumb tright"><div class="thumbcaption">A skyline photo</div></div>
<p>See the picture at <a href="/wiki/File:Skyline.jpg">Skyline.jpg</a> for a view.</p>
<h2>See also</h2>
<ul><li><a href="/wiki/Malaysia">Malaysia</a></li></ul>
<h2>References</h2>
<div class="reflist"><ol class="references"><li>Some reference</li></ol></div>
<h2>External links</h2>
<p><a href="https://example.com">Official site</a></p>
<div class="navbox">Navigation box links everywhere</div>
<div class="catlinks">Categories: Island countries</div>
</div></div>
<footer>Footer chrome</footer>
</body></html>"#
        .to_string()
}

#[test]
fn no_html_or_editorial_markers_leak_through() -> anyhow::Result<()> {
    let pipeline = ContentPipeline::new(20);
    let markdown = pipeline.process(&messy_article())?;

    assert!(!markdown.contains('<'), "no tag syntax may survive:\n{markdown}");
    assert!(!markdown.contains('>'), "no tag syntax may survive:\n{markdown}");
    for forbidden in ["[edit]", "[1]", "[2]", "[3]", "[citation needed]", "[when?]"] {
        assert!(!markdown.contains(forbidden), "{forbidden} leaked:\n{markdown}");
    }
    for forbidden in ["infobox", "navbox", "reflist", "alert(1)", "color: red", "hidden comment"] {
        assert!(!markdown.contains(forbidden), "{forbidden} leaked:\n{markdown}");
    }
    Ok(())
}

#[test]
fn pipeline_is_idempotent() -> anyhow::Result<()> {
    let pipeline = ContentPipeline::new(20);
    let once = pipeline.process(&messy_article())?;
    let twice = pipeline.process(&once)?;
    assert_eq!(once, twice, "pipeline(pipeline(h)) must equal pipeline(h)");
    Ok(())
}

#[test]
fn tail_sections_are_removed_but_earlier_content_stays() -> anyhow::Result<()> {
    let pipeline = ContentPipeline::new(20);
    let markdown = pipeline.process(&messy_article())?;

    assert!(markdown.contains("Singapore"), "lead paragraph must survive");
    assert!(markdown.contains("## History"), "content heading must survive");
    assert!(markdown.contains("1819"), "history body must survive");
    assert!(!markdown.contains("See also"), "see-also section must be removed");
    assert!(!markdown.contains("Malaysia"), "see-also content must be removed");
    assert!(!markdown.contains("References"), "references section must be removed");
    assert!(!markdown.contains("External links"), "external links must be removed");
    assert!(!markdown.contains("Official site"), "external links content must be removed");
    Ok(())
}

#[test]
fn wiki_article_links_keep_their_href() -> anyhow::Result<()> {
    let pipeline = ContentPipeline::new(20);
    let markdown = pipeline.process(&messy_article())?;

    assert!(
        markdown.contains("[port](/wiki/Port)"),
        "internal article links keep their href:\n{markdown}"
    );
    assert!(!markdown.contains("Skyline.jpg"), "file links are removed entirely");
    Ok(())
}

#[test]
fn markdown_structure_is_well_formed() -> anyhow::Result<()> {
    let pipeline = ContentPipeline::new(20);
    let markdown = pipeline.process(&messy_article())?;

    assert!(markdown.contains("- First point"));
    assert!(markdown.contains("- Second point"));
    assert!(markdown.contains("**Singapore**"));
    assert!(markdown.ends_with('\n'), "output ends with a single newline");
    assert!(!markdown.ends_with("\n\n"));
    assert!(!markdown.contains("\n\n\n"), "blank runs are capped");
    for line in markdown.lines() {
        assert_eq!(line, line.trim(), "every line is trimmed: {line:?}");
    }
    Ok(())
}

#[test]
fn too_short_output_is_a_processing_error() {
    let pipeline = ContentPipeline::new(20);
    let html = "<html><body><div id=\"mw-content-text\"><p>Tiny.</p></div></body></html>";
    let err = pipeline.process(html).expect_err("short output must fail");
    assert!(
        err.to_string().to_lowercase().contains("processing"),
        "error message must categorize as content processing: {err}"
    );
}

#[test]
fn threshold_is_configurable() -> anyhow::Result<()> {
    let lenient = ContentPipeline::new(1);
    let html = "<html><body><div id=\"mw-content-text\"><p>Tiny.</p></div></body></html>";
    let markdown = lenient.process(html)?;
    assert!(markdown.contains("Tiny."));
    Ok(())
}
