//! Turns generated files into a buildable Angular workspace.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use crate::errors::StageError;
use crate::jobs::stages::{ProjectFiles, ProjectMaterializer};

const DEFAULT_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Design Forge Project</title>
  <base href="/">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link rel="icon" type="image/x-icon" href="favicon.ico">
  <link rel="stylesheet" href="styles.css">
</head>
<body>
  <app-root></app-root>
</body>
</html>
"#;

const DEFAULT_STYLES_CSS: &str = r#"* {
  margin: 0;
  padding: 0;
  box-sizing: border-box;
}

body {
  font-family: Arial, sans-serif;
}
"#;

const DEFAULT_MAIN_TS: &str = r#"import { bootstrapApplication } from '@angular/platform-browser';
import { AppComponent } from './app/app.component';
import { provideAnimations } from '@angular/platform-browser/animations';

bootstrapApplication(AppComponent, {
  providers: [provideAnimations()]
}).catch(err => console.error(err));
"#;

/// Writes the Angular project skeleton plus the generated sources.
#[derive(Debug, Clone)]
pub struct AngularScaffold {
    /// Build output directory relative to the workspace; must match the
    /// directory the builder publishes from.
    output_dir: PathBuf,
}

impl AngularScaffold {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Every file to write, relative to the workspace root.
    pub fn layout(&self, generated: &ProjectFiles) -> Result<Vec<(PathBuf, String)>, StageError> {
        let mut sources = generated.clone();
        for name in sources.keys() {
            if !is_plain_file_name(name) {
                return Err(StageError::Materialize(format!(
                    "refusing to write generated file '{}'",
                    name
                )));
            }
        }

        // The workspace config is always ours; it must agree with `output_dir`.
        sources.remove("angular.json");
        sources
            .entry("index.html".into())
            .or_insert_with(|| DEFAULT_INDEX_HTML.to_string());
        sources
            .entry("styles.css".into())
            .or_insert_with(|| DEFAULT_STYLES_CSS.to_string());
        let main_ts = match sources.get("main.ts") {
            Some(main) if main.contains("bootstrapApplication") => main.replace(
                "from './app.component'",
                "from './app/app.component'",
            ),
            _ => DEFAULT_MAIN_TS.to_string(),
        };
        sources.insert("main.ts".into(), main_ts);

        let mut out = vec![
            (PathBuf::from("package.json"), pretty(&self.package_json())?),
            (PathBuf::from("angular.json"), pretty(&self.angular_json())?),
            (PathBuf::from("tsconfig.json"), pretty(&tsconfig_json())?),
            (PathBuf::from("tsconfig.app.json"), pretty(&tsconfig_app_json())?),
            (
                PathBuf::from("src/environments/environment.ts"),
                "export const environment = { production: false };\n".to_string(),
            ),
            (
                PathBuf::from("src/environments/environment.prod.ts"),
                "export const environment = { production: true };\n".to_string(),
            ),
            (PathBuf::from("src/favicon.ico"), String::new()),
        ];

        for (name, content) in sources {
            let dir = if name.contains(".component") {
                "src/app"
            } else {
                "src"
            };
            out.push((Path::new(dir).join(&name), content));
        }
        Ok(out)
    }

    fn package_json(&self) -> serde_json::Value {
        json!({
            "name": "design-forge-project",
            "version": "0.0.0",
            "private": true,
            "scripts": {
                "ng": "ng",
                "start": "ng serve",
                "build": "ng build",
                "watch": "ng build --watch --configuration development"
            },
            "dependencies": {
                "@angular/animations": "^17.0.0",
                "@angular/common": "^17.0.0",
                "@angular/compiler": "^17.0.0",
                "@angular/core": "^17.0.0",
                "@angular/forms": "^17.0.0",
                "@angular/platform-browser": "^17.0.0",
                "@angular/platform-browser-dynamic": "^17.0.0",
                "@angular/router": "^17.0.0",
                "rxjs": "~7.8.0",
                "tslib": "^2.3.0",
                "zone.js": "~0.14.2"
            },
            "devDependencies": {
                "@angular-devkit/build-angular": "^17.0.0",
                "@angular/cli": "^17.0.0",
                "@angular/compiler-cli": "^17.0.0",
                "typescript": "~5.2.2"
            }
        })
    }

    fn angular_json(&self) -> serde_json::Value {
        let output_path = self.output_dir.to_string_lossy().replace('\\', "/");
        json!({
            "$schema": "./node_modules/@angular/cli/lib/config/schema.json",
            "version": 1,
            "newProjectRoot": "projects",
            "projects": {
                "design-forge": {
                    "projectType": "application",
                    "root": "",
                    "sourceRoot": "src",
                    "prefix": "app",
                    "architect": {
                        "build": {
                            "builder": "@angular-devkit/build-angular:browser",
                            "options": {
                                "outputPath": output_path,
                                "index": "src/index.html",
                                "main": "src/main.ts",
                                "polyfills": ["zone.js"],
                                "tsConfig": "tsconfig.app.json",
                                "assets": ["src/favicon.ico", "src/assets"],
                                "styles": ["src/styles.css"],
                                "scripts": []
                            },
                            "configurations": {
                                "production": {
                                    "budgets": [
                                        {"type": "initial", "maximumWarning": "500kb", "maximumError": "1mb"},
                                        {"type": "anyComponentStyle", "maximumWarning": "2kb", "maximumError": "4kb"}
                                    ],
                                    "outputHashing": "all"
                                },
                                "development": {
                                    "buildOptimizer": false,
                                    "optimization": false,
                                    "vendorChunk": true,
                                    "extractLicenses": false,
                                    "sourceMap": true,
                                    "namedChunks": true
                                }
                            },
                            "defaultConfiguration": "production"
                        }
                    }
                }
            }
        })
    }
}

fn tsconfig_json() -> serde_json::Value {
    json!({
        "compileOnSave": false,
        "compilerOptions": {
            "baseUrl": "./",
            "outDir": "./dist/out-tsc",
            "forceConsistentCasingInFileNames": true,
            "strict": true,
            "noImplicitOverride": true,
            "noPropertyAccessFromIndexSignature": true,
            "noImplicitReturns": true,
            "noFallthroughCasesInSwitch": true,
            "sourceMap": true,
            "declaration": false,
            "downlevelIteration": true,
            "experimentalDecorators": true,
            "moduleResolution": "node",
            "importHelpers": true,
            "target": "ES2022",
            "module": "ES2022",
            "useDefineForClassFields": false,
            "lib": ["ES2022", "dom"]
        },
        "angularCompilerOptions": {
            "enableI18nLegacyMessageIdFormat": false,
            "strictInjectionParameters": true,
            "strictInputAccessModifiers": true,
            "strictTemplates": true
        }
    })
}

fn tsconfig_app_json() -> serde_json::Value {
    json!({
        "extends": "./tsconfig.json",
        "compilerOptions": { "outDir": "./out-tsc/app", "types": [] },
        "files": ["src/main.ts"],
        "include": ["src/**/*.d.ts"]
    })
}

fn pretty(value: &serde_json::Value) -> Result<String, StageError> {
    serde_json::to_string_pretty(value).map_err(|e| StageError::Materialize(e.to_string()))
}

/// A single normal path component: no separators, no `..`, not empty.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[async_trait]
impl ProjectMaterializer for AngularScaffold {
    async fn materialize(&self, workspace: &Path, files: &ProjectFiles) -> Result<(), StageError> {
        let io_err = |path: &Path, e: std::io::Error| {
            StageError::Materialize(format!("{}: {}", path.display(), e))
        };

        let assets = workspace.join("src/assets");
        tokio::fs::create_dir_all(&assets)
            .await
            .map_err(|e| io_err(assets.as_path(), e))?;

        for (relative, content) in self.layout(files)? {
            let path = workspace.join(&relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_err(parent, e))?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| io_err(path.as_path(), e))?;
        }
        Ok(())
    }
}
