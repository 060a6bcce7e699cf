use anyhow::Result;
use cevennes_connect::pipeline::Scraper;
use cevennes_connect::testing::StaticFetcher;
use std::sync::Arc;

const PAGE_A: &str = r#"
<html><body>
  <article class="event"><h2>Fête de la châtaigne</h2><span class="date">26 octobre 2025</span><span class="lieu">Saint-Jean-du-Gard</span></article>
  <article class="event"><h2>Concert baroque</h2><span class="date">2 novembre 2025</span><span class="lieu">Anduze</span></article>
  <article class="event"><h2>Atelier vannerie</h2><span class="date">8 novembre 2025</span><span class="lieu">Lasalle</span></article>
</body></html>
"#;

const PAGE_C: &str = r#"
<html><body>
  <article class="event"><h2>Concert baroque</h2><span class="date">2 novembre 2025</span><span class="lieu">Anduze</span></article>
  <article class="event"><h2>Loto des écoles</h2><span class="date">9 novembre 2025</span></article>
</body></html>
"#;

const DETAIL: &str = r#"
<html><head><meta name="description" content="Grand concert baroque dans le temple d'Anduze, avec l'ensemble Les Cévenols. Réservation conseillée."></head>
<body><p>Début à 20h30. Tarif : 12 € sur place.</p></body></html>
"#;

#[tokio::test]
async fn test_failing_url_does_not_abort_the_scrape() -> Result<()> {
    let fetcher = StaticFetcher::new()
        .page("https://a.example/agenda", PAGE_A)
        .failing("https://b.example/agenda");
    let scraper = Scraper::new(Arc::new(fetcher));

    let report = scraper
        .scrape(
            &["https://a.example/agenda".to_string(), "https://b.example/agenda".to_string()],
            false,
        )
        .await;

    assert_eq!(report.events.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, "https://b.example/agenda");
    assert_eq!(report.pages_ok, 1);
    assert!(report.events.iter().all(|e| e.source_url == "https://a.example/agenda"));
    Ok(())
}

#[tokio::test]
async fn test_same_title_and_date_across_urls_is_kept_once() -> Result<()> {
    let fetcher = StaticFetcher::new()
        .page("https://a.example/agenda", PAGE_A)
        .page("https://c.example/agenda", PAGE_C);
    let scraper = Scraper::new(Arc::new(fetcher));

    let report = scraper
        .scrape(
            &["https://a.example/agenda".to_string(), "https://c.example/agenda".to_string()],
            false,
        )
        .await;

    assert_eq!(report.events.len(), 4);
    let baroque = report.events.iter().filter(|e| e.title == "Concert baroque").count();
    assert_eq!(baroque, 1);
    Ok(())
}

#[tokio::test]
async fn test_deep_mode_enriches_from_detail_pages() -> Result<()> {
    let listing = r#"<html><body><article class="event"><h2>Concert baroque</h2><span class="date">2 novembre 2025</span><a href="/concert-baroque">Détails</a></article></body></html>"#;
    let fetcher = Arc::new(
        StaticFetcher::new()
            .page("https://a.example/agenda", listing)
            .page("https://a.example/concert-baroque", DETAIL),
    );
    let scraper = Scraper::new(fetcher.clone());

    let report = scraper.scrape(&["https://a.example/agenda".to_string()], true).await;

    let event = &report.events[0];
    assert!(event.description.starts_with("Grand concert baroque"));
    assert_eq!(event.time.as_deref(), Some("20:30"));
    assert_eq!(event.price.as_deref(), Some("12 €"));
    assert_eq!(fetcher.fetched().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_output_is_capped_per_url() -> Result<()> {
    let blocks: String = (0..80)
        .map(|i| format!(r#"<article class="event"><h2>Soirée numéro {i}</h2><span class="date">{} mai 2025</span></article>"#, i % 28 + 1))
        .collect();
    let html = format!("<html><body>{blocks}</body></html>");
    let scraper = Scraper::new(Arc::new(StaticFetcher::new().page("https://a.example/", &html)));

    let report = scraper.scrape(&["https://a.example/".to_string()], false).await;
    assert_eq!(report.events.len(), 50);
    Ok(())
}
