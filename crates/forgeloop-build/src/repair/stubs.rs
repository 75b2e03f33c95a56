//! Placeholder sources written by the repairer.

pub const SMOKE_TEST: &str = "import 'package:flutter_test/flutter_test.dart';

void main() {
  test('smoke', () {
    expect(1 + 1, 2);
  });
}
";

pub fn widget_stub(name: &str) -> String {
    format!(
        "import 'package:flutter/material.dart';

class {name} extends StatelessWidget {{
  const {name}({{super.key}});
  @override
  Widget build(BuildContext context) {{
    return Scaffold(
      appBar: AppBar(title: const Text('{name}')),
      body: const Center(child: Text('{name} placeholder')),
    );
  }}
}}
"
    )
}

pub fn class_stub(name: &str) -> String {
    format!("class {name} {{ const {name}(); }}\n")
}
