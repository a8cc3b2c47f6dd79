use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::collections::BTreeMap;

use comanda_core::{IngredientId, MenuId};
use comanda_inventory::{StockLevel, plan_deduction};
use comanda_menu::{Recipe, RecipeEntry};
use comanda_sales::resolve;

/// Catalog of `menus` menus, each using five of `ingredients` ingredients.
fn catalog(menus: i64, ingredients: i64) -> BTreeMap<MenuId, Recipe> {
    (0..menus)
        .map(|m| {
            let entries = (0..5).map(|k| {
                RecipeEntry::new(IngredientId::new((m * 7 + k * 13) % ingredients), 0.5 + k as f64)
            });
            let recipe = Recipe::new(dedup(entries)).expect("valid recipe");
            (MenuId::new(m), recipe)
        })
        .collect()
}

fn dedup(entries: impl Iterator<Item = RecipeEntry>) -> Vec<RecipeEntry> {
    let mut seen = BTreeMap::new();
    for e in entries {
        seen.entry(e.ingredient_id).or_insert(e);
    }
    seen.into_values().collect()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_requirements");
    let book = catalog(200, 500);

    for lines in [1usize, 10, 100].iter() {
        let requests: Vec<(MenuId, i64)> = (0..*lines)
            .map(|i| (MenuId::new((i * 31 % 200) as i64), 1 + (i % 4) as i64))
            .collect();

        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &requests, |b, requests| {
            b.iter(|| resolve(black_box(requests.iter().copied()), &book).expect("resolve"));
        });
    }

    group.finish();
}

fn bench_plan_deduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_deduction");
    let book = catalog(200, 500);
    let levels: BTreeMap<IngredientId, StockLevel> = (0..500)
        .map(|i| {
            let id = IngredientId::new(i);
            (
                id,
                StockLevel {
                    ingredient_id: id,
                    name: format!("ingredient-{i}"),
                    quantity: 1_000_000.0,
                },
            )
        })
        .collect();

    let requests: Vec<(MenuId, i64)> = (0..50).map(|i| (MenuId::new(i * 3), 2)).collect();
    let requirements = resolve(requests, &book).expect("resolve");

    group.bench_function("50_menus", |b| {
        b.iter(|| plan_deduction(black_box(&requirements), &levels).expect("plan"));
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_plan_deduction);
criterion_main!(benches);
