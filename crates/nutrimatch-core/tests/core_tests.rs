use std::fs;
use tempfile::TempDir;

use nutrimatch_core::dataset::DatasetReader;
use nutrimatch_core::types::{Calories, FoodCatalog};

const HEADER: &str = "alim_grp_code,alim_ssgrp_code,alim_ssssgrp_code,alim_grp_nom_fr,alim_ssgrp_nom_fr,alim_code,alim_nom_fr,alim_nom_en,Energie (kcal/100 g)";

fn write_csv(dir: &TempDir, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join("ciqual.csv");
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn reads_quoted_names_and_calorie_placeholders() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(&tmp, &[
        r#"02,0201,020101,fruits légumes,légumes,20010,"Champignon, cru","Mushroom, raw","22,0""#,
        r#"09,0901,090101,céréales,riz,9100,"Riz blanc, cuit","Rice, white, cooked",-"#,
        r#"05,0502,050201,viandes,volaille,36018,"Poulet, filet, grillé","Chicken breast, grilled",traces"#,
    ]);

    let entries = DatasetReader::default().read(&path).expect("read dataset");
    assert_eq!(entries.len(), 3);

    let mushroom = &entries[0];
    assert_eq!(mushroom.id, "20010");
    assert_eq!(mushroom.name_en, "Mushroom, raw");
    assert_eq!(mushroom.name_fr, "Champignon, cru");
    assert_eq!(mushroom.group_code.as_deref(), Some("02"));
    assert_eq!(mushroom.calories_per_100g, Calories::Known(22.0));

    assert_eq!(entries[1].calories_per_100g, Calories::Unknown, "'-' stays unknown");
    assert_eq!(entries[2].calories_per_100g, Calories::Unknown, "'traces' stays unknown");

    let catalog = FoodCatalog::from_entries(entries).expect("unique ids");
    assert_eq!(catalog.id_at(2).map(String::as_str), Some("36018"));
}

#[test]
fn limit_keeps_first_rows() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(&tmp, &[
        "02,0201,020101,a,b,1,un,one,10",
        "02,0201,020101,a,b,2,deux,two,20",
        "02,0201,020101,a,b,3,trois,three,30",
    ]);
    let entries = DatasetReader::default().with_limit(Some(2)).read(&path).expect("read");
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn semicolon_delimited_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("raw.csv");
    fs::write(&path, "alim_code;alim_nom_en;Energie (kcal/100 g)\n20010;Mushroom, raw;22,5\n").unwrap();
    let entries = DatasetReader::new(';').unwrap().read(&path).expect("read");
    assert_eq!(entries[0].name_en, "Mushroom, raw");
    assert_eq!(entries[0].calories_per_100g, Calories::Known(22.5));
    assert_eq!(entries[0].group_code, None);
}

#[test]
fn missing_required_column_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.csv");
    fs::write(&path, "alim_code,alim_nom_fr\n1,pomme\n").unwrap();
    let err = DatasetReader::default().read(&path).unwrap_err();
    assert!(err.to_string().contains("alim_nom_en"), "{err}");
}

#[test]
fn empty_name_is_a_build_error() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(&tmp, &["02,0201,020101,a,b,7,sept,,70"]);
    let err = DatasetReader::default().read(&path).unwrap_err();
    assert!(format!("{err:#}").contains("row 1"), "{err:#}");
}
