//! Datasets whose shape is fixed in code rather than discovered from a catalog.

use crate::query::descriptor::GEOMETRY_ALIAS;
use crate::query::{ExtraFilter, Operator, ProjectionField, QueryDescriptor};

/// Materialized views that already expose `id`, `display`, `type` and `uri` columns.
fn view(dataset: &str, table: &str, view: &str, operator: Operator, connection_key: &str) -> QueryDescriptor {
    QueryDescriptor::new(dataset, table, ("public", view), GEOMETRY_ALIAS, operator, connection_key).with_projection(vec![
        ProjectionField::column("id", "id"),
        ProjectionField::column("display", "display"),
        ProjectionField::column("type", "type"),
        ProjectionField::column("uri", "uri"),
        ProjectionField::Geometry(GEOMETRY_ALIAS.to_string()),
    ])
}

fn bag() -> Vec<QueryDescriptor> {
    let tables: &[(&str, &str, &str)] = &[
        ("bag", "pand", "geo_bag_pand_mat"),
        ("bag", "ligplaats", "geo_bag_ligplaats_mat"),
        ("bag", "standplaats", "geo_bag_standplaats_mat"),
        ("bag", "verblijfsobject", "geo_bag_verblijfsobject_mat"),
        ("gebieden", "stadsdeel", "geo_bag_stadsdeel_mat"),
        ("gebieden", "buurt", "geo_bag_buurt_mat"),
        ("gebieden", "buurtcombinatie", "geo_bag_buurtcombinatie_mat"),
        ("gebieden", "bouwblok", "geo_bag_bouwblok_mat"),
        ("gebieden", "grootstedelijkgebied", "geo_bag_grootstedelijkgebied_mat"),
        ("gebieden", "gebiedsgerichtwerken", "geo_bag_gebiedsgerichtwerken_mat"),
        ("gebieden", "unesco", "geo_bag_unesco_mat"),
        ("lki", "kadastraal_object", "geo_lki_kadastraalobject_mat"),
        ("wkpb", "beperking", "geo_wkpb_mat"),
    ];
    let mut descriptors: Vec<QueryDescriptor> = tables
        .iter()
        .map(|(dataset, table, mat)| view(dataset, table, mat, Operator::Contains, "DSN_BAG"))
        .collect();

    let mut openbareruimte = view("bag", "openbareruimte", "geo_bag_openbareruimte_mat", Operator::Contains, "DSN_BAG");
    openbareruimte.projection.push(ProjectionField::column("opr_type", "opr_type"));
    descriptors.push(openbareruimte);
    descriptors
}

fn nap() -> Vec<QueryDescriptor> {
    vec![
        view("nap", "peilmerk", "geo_nap_peilmerk_mat", Operator::Within, "DSN_NAP"),
        view("meetbouten", "meetbout", "geo_meetbouten_meetbout_mat", Operator::Within, "DSN_NAP"),
    ]
}

fn munitie() -> Vec<QueryDescriptor> {
    vec![
        view("munitie", "gevrijwaardgebied", "geo_bommenkaart_gevrijwaardgebied_polygon", Operator::Contains, "DSN_MILIEU"),
        view("munitie", "uitgevoerdonderzoek", "geo_bommenkaart_uitgevoerdonderzoek_polygon", Operator::Contains, "DSN_MILIEU"),
        view("munitie", "verdachtgebied", "geo_bommenkaart_verdachtgebied_polygon", Operator::Contains, "DSN_MILIEU"),
        view("munitie", "bominslag", "geo_bommenkaart_bominslag_point", Operator::Within, "DSN_MILIEU"),
    ]
}

fn monumenten(api_base_url: &str) -> QueryDescriptor {
    QueryDescriptor::new(
        "monumenten",
        "monument",
        ("public", "dataset_monument"),
        "monumentcoordinaten",
        Operator::Within,
        "DSN_MONUMENTEN",
    )
    .with_projection(vec![
        ProjectionField::column("display_naam", "display"),
        ProjectionField::TypeLiteral("monumenten/monument".to_string()),
        ProjectionField::Uri {
            base: format!("{}monumenten/monumenten/", api_base_url),
            id_column: "id".to_string(),
        },
        ProjectionField::Geometry("monumentcoordinaten".to_string()),
    ])
    .with_output_properties(&["display", "type", "uri", "distance"])
    .with_extra_fields(["monumenttype"])
}

fn grondexploitatie(api_base_url: &str) -> QueryDescriptor {
    QueryDescriptor::new(
        "grondexploitatie",
        "grondexploitatie",
        ("public", "grex_grenzen_ogagis_2016"),
        "wkb_geometry",
        Operator::Contains,
        "DSN_GREX",
    )
    .with_projection(vec![
        ProjectionField::column("plannaam", "display"),
        ProjectionField::TypeLiteral("grex/grondexploitatie".to_string()),
        ProjectionField::Uri {
            base: format!("{}grondexploitatie/project/", api_base_url),
            id_column: "plannr".to_string(),
        },
        ProjectionField::Geometry("wkb_geometry".to_string()),
    ])
    .with_output_properties(&["display", "type", "uri", "distance"])
    .with_extra_filter(ExtraFilter::column_in("planstatus", vec!["A".to_string(), "T".to_string()]))
}

const BIZ_COLUMNS: &[&str] = &[
    "biz_id",
    "biz_type",
    "heffingsgrondslag",
    "website",
    "heffing",
    "bijdrageplichtigen",
    "verordening",
];

fn biz(api_base_url: &str) -> QueryDescriptor {
    let mut projection = vec![
        ProjectionField::column("naam", "display"),
        ProjectionField::TypeLiteral("vsd/biz".to_string()),
        ProjectionField::Uri { base: format!("{}vsd/biz/", api_base_url), id_column: "biz_id".to_string() },
        ProjectionField::Geometry("wkb_geometry".to_string()),
    ];
    projection.extend(BIZ_COLUMNS.iter().map(|c| ProjectionField::column(*c, *c)));

    let mut properties = vec!["display", "type", "uri"];
    properties.extend_from_slice(BIZ_COLUMNS);
    properties.push("distance");

    QueryDescriptor::new(
        "vsd",
        "biz",
        ("public", "biz_data"),
        "wkb_geometry",
        Operator::Contains,
        "DSN_VARIOUS_SMALL_DATASETS",
    )
    .with_projection(projection)
    .with_output_properties(&properties)
}

/// Every built-in descriptor. Callers register only those whose connection is configured.
pub fn builtin_descriptors(api_base_url: &str) -> Vec<QueryDescriptor> {
    let mut descriptors = bag();
    descriptors.extend(nap());
    descriptors.extend(munitie());
    descriptors.push(monumenten(api_base_url));
    descriptors.push(grondexploitatie(api_base_url));
    descriptors.push(biz(api_base_url));
    descriptors
}
